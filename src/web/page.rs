use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::outcome::text_or_sentinel;
use crate::persona::{self, Persona};
use crate::shell::{PipelineStage, ShellState};

const TITLE: &str = "Personalized Newsletter";

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:52rem;margin:2rem auto;padding:0 1rem}\
article{border-bottom:1px solid #ddd;padding:.5rem 0}.source{color:#666;font-size:.9rem}\
.success{color:#1a7f37}.warning{color:#9a6700}.stages{color:#555;list-style:none;padding:0}";

/// Idle page: persona selector, interests, fetch button.
pub fn index(selected: &Persona) -> String {
    layout(&selector(selected))
}

/// Page after a run: stage log, notice, article list and, when ready, highlights plus the download form.
pub fn results(state: &ShellState, stages: &[PipelineStage]) -> String {
    let mut body = selector(state.persona());

    body.push_str("<ul class=\"stages\">");
    for stage in stages {
        let _ = write!(body, "<li>{}</li>", text(stage.message()));
    }
    body.push_str("</ul>");

    if let Some(notice) = state.notice() {
        let class = if notice.is_warning() { "warning" } else { "success" };
        let _ = write!(body, "<p class=\"{class}\">{}</p>", text(&notice.message()));
    }

    for article in state.articles() {
        let _ = write!(
            body,
            "<article><h3><a href=\"{}\" target=\"_blank\">{}</a></h3><p class=\"source\">Source: {}</p><p>{}</p></article>",
            attr(&article.link),
            text(&article.title),
            text(&article.source),
            text(&article.preview()),
        );
    }

    if let (Some(newsletter), Some(download)) = (state.newsletter(), state.download()) {
        let _ = write!(body, "<h2>Highlights</h2><p>{}</p>", text(text_or_sentinel(&newsletter.highlights)));
        let _ = write!(
            body,
            "<form method=\"post\" action=\"/download\"><textarea name=\"markdown\" hidden>{}</textarea>\
             <button type=\"submit\">Download Markdown Newsletter</button></form>",
            text(&download.body),
        );
    }
    layout(&body)
}

pub fn error(selected: &Persona, message: &str) -> String {
    let mut body = selector(selected);
    let _ = write!(body, "<p class=\"warning\">{}</p>", text(message));
    layout(&body)
}

fn selector(selected: &Persona) -> String {
    let mut out = String::from(
        "<form method=\"get\" action=\"/\"><label>Choose a persona \
         <select name=\"persona\" onchange=\"this.form.submit()\">",
    );
    for p in persona::catalog() {
        let label = p.label();
        let sel = if p.name == selected.name { " selected" } else { "" };
        let _ = write!(out, "<option value=\"{}\"{sel}>{}</option>", attr(p.name), text(&label));
    }
    out.push_str("</select></label><noscript><button type=\"submit\">Select</button></noscript></form>");

    let _ = write!(out, "<p><strong>Interests:</strong> {}</p>", text(&selected.interests.join(", ")));
    let _ = write!(
        out,
        "<form method=\"post\" action=\"/fetch\"><input type=\"hidden\" name=\"persona\" value=\"{}\">\
         <button type=\"submit\">Fetch &amp; Filter</button></form>",
        attr(selected.name),
    );
    out
}

fn layout(body: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{TITLE}</title><style>{STYLE}</style></head>\
         <body><h1>📰 {TITLE}</h1>{body}</body></html>"
    )
}
