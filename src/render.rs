use std::fmt::Write;

use crate::summarize::SummarizedArticle;

pub const FILE_NAME: &str = "newsletter.md";
pub const MIME_TYPE: &str = "text/markdown";

/// Formats the newsletter markdown. Pure: same inputs, same bytes.
pub fn render(persona_name: &str, summaries: &[SummarizedArticle], highlight_text: &str) -> String {
    let mut md = String::new();
    // writing into a String cannot fail
    let _ = write!(md, "# {persona_name}'s Personalized Newsletter\n\n");
    md.push_str("## Highlights\n");
    md.push_str(highlight_text);
    md.push_str("\n\n---\n");

    for article in summaries {
        let _ = writeln!(md, "## [{}]({})", article.title, article.link);
        let _ = write!(md, "*Source:* {}\n\n", article.source);
        let _ = write!(md, "{}\n\n", article.summary_text());
        md.push_str("---\n");
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{FailureKind, Stage, StageFailure};

    fn item(title: &str, summary: Result<&str, StageFailure>) -> SummarizedArticle {
        SummarizedArticle {
            title: title.to_string(),
            link: format!("https://example.com/{title}"),
            source: "https://feeds.bbci.co.uk/sport/rss.xml".into(),
            summary: summary.map(str::to_string),
        }
    }

    #[test]
    fn renders_fixed_structure() {
        let md = render("Marco Rossi", &[item("derby", Ok("Late winner."))], "Big weekend.");
        assert_eq!(
            md,
            "# Marco Rossi's Personalized Newsletter\n\n\
             ## Highlights\nBig weekend.\n\n---\n\
             ## [derby](https://example.com/derby)\n\
             *Source:* https://feeds.bbci.co.uk/sport/rss.xml\n\n\
             Late winner.\n\n---\n"
        );
    }

    #[test]
    fn empty_summaries_end_after_highlights() {
        let md = render("Lisa Thompson", &[], "Nothing new.");
        assert!(md.ends_with("## Highlights\nNothing new.\n\n---\n"));
        assert_eq!(md.matches("## ").count(), 1);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let items = vec![item("a", Ok("one")), item("b", Ok("two"))];
        assert_eq!(render("P", &items, "h"), render("P", &items, "h"));
    }

    #[test]
    fn failed_summary_renders_sentinel() {
        let failed = StageFailure::new(Stage::Extract, FailureKind::Unreachable, "404");
        let md = render("P", &[item("gone", Err(failed))], "h");
        assert!(md.contains("\n⚠️ Failed to extract article content.\n"));
    }
}
