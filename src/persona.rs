use serde::Serialize;

/// A predefined reader profile: who they are, what they care about, and where to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Persona {
    pub name: &'static str,
    pub role: &'static str,
    pub region: &'static str,
    pub interests: &'static [&'static str],
    pub feeds: &'static [&'static str],
}

impl Persona {
    /// Display label, e.g. `Marco Rossi (Sports Journalist, Italy)`.
    pub fn label(&self) -> String {
        format!("{} ({}, {})", self.name, self.role, self.region)
    }

    fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        self.name.eq_ignore_ascii_case(key) || self.label().eq_ignore_ascii_case(key)
    }
}

static CATALOG: [Persona; 5] = [
    Persona {
        name: "Alex Parker",
        role: "Tech Enthusiast",
        region: "USA",
        interests: &["AI", "cybersecurity", "blockchain", "startups", "programming"],
        feeds: &["https://techcrunch.com/feed/"],
    },
    Persona {
        name: "Priya Sharma",
        role: "Finance & Business Guru",
        region: "India",
        interests: &["global markets", "startups", "fintech", "cryptocurrency", "economics"],
        feeds: &["https://search.cnbc.com/rs/search/combinedcms/view.xml?partnerId=wrss01&id=100003114"],
    },
    Persona {
        name: "Marco Rossi",
        role: "Sports Journalist",
        region: "Italy",
        interests: &["football", "F1", "NBA", "Olympic sports", "esports"],
        feeds: &["https://feeds.bbci.co.uk/sport/rss.xml"],
    },
    Persona {
        name: "Lisa Thompson",
        role: "Entertainment Buff",
        region: "UK",
        interests: &["movies", "celebrity news", "TV shows", "music", "books"],
        feeds: &["https://www.billboard.com/feed/"],
    },
    Persona {
        name: "David Martinez",
        role: "Science & Space Nerd",
        region: "Spain",
        interests: &["space exploration", "AI", "biotech", "physics", "renewable energy"],
        feeds: &["https://www.nasa.gov/feed/"],
    },
];

pub fn catalog() -> &'static [Persona] {
    &CATALOG
}

/// Look a persona up by name or full label, ignoring ASCII case.
pub fn find(key: &str) -> Option<&'static Persona> {
    CATALOG.iter().find(|p| p.matches(key))
}

pub fn default_persona() -> &'static Persona {
    &CATALOG[0]
}

#[derive(clap::Args, Debug)]
pub struct PersonasCmd {}

#[derive(Serialize)]
struct PersonaRow {
    label: String,
    interests: &'static [&'static str],
    feeds: &'static [&'static str],
}

/// Prints the catalog, or a result envelope with `--json`.
pub fn run(_args: PersonasCmd) -> anyhow::Result<()> {
    use crate::telemetry::{self, config};
    use crate::telemetry::ops::personas::Phase;
    let log = telemetry::personas();
    let _g = log.root_span_kv([("count", catalog().len().to_string())]).entered();
    let _s = log.span(&Phase::List).entered();

    if config::json_mode() {
        let rows: Vec<PersonaRow> = catalog()
            .iter()
            .map(|p| PersonaRow { label: p.label(), interests: p.interests, feeds: p.feeds })
            .collect();
        return log.result(&rows);
    }
    for p in catalog() {
        println!("{}", p.label());
        println!("  interests: {}", p.interests.join(", "));
        for feed in p.feeds {
            println!("  feed: {feed}");
        }
    }
    Ok(())
}
