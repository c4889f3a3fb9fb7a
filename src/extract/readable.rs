use scraper::{ElementRef, Html, Selector};

// paragraphs inside these never count as article body
const BOILERPLATE: [&str; 7] = ["nav", "header", "footer", "aside", "form", "script", "style"];
const MIN_WORDS: usize = 3;

/// Readable text of an article page: the paragraphs of the block that carries the most prose,
/// separated by blank lines. Falls back to the text of a main container when the page has no usable `<p>`.
pub fn article_text(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    dense_block(&doc).or_else(|| container_text(&doc))
}

fn dense_block(doc: &Html) -> Option<String> {
    let p_sel = Selector::parse("p").ok()?;
    // (parent, score, paragraphs) in document order; ties go to the earlier block
    let mut blocks: Vec<(ElementRef<'_>, usize, Vec<String>)> = Vec::new();
    for p in doc.select(&p_sel) {
        if in_boilerplate(&p) { continue; }
        let text = collapse(&p.text().collect::<String>());
        if text.split_whitespace().count() < MIN_WORDS { continue; }
        let Some(parent) = p.parent().and_then(ElementRef::wrap) else { continue };
        match blocks.iter_mut().find(|(node, _, _)| *node == parent) {
            Some((_, score, paras)) => {
                *score += text.len();
                paras.push(text);
            }
            None => blocks.push((parent, text.len(), vec![text])),
        }
    }

    let mut best: Option<(usize, Vec<String>)> = None;
    for (_, score, paras) in blocks {
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, paras));
        }
    }
    best.map(|(_, paras)| paras.join("\n\n"))
}

fn container_text(doc: &Html) -> Option<String> {
    for selector in ["article", "[itemprop=articleBody]", "main", "[role=main]", "body"] {
        let Ok(sel) = Selector::parse(selector) else { continue };
        let Some(node) = doc.select(&sel).next() else { continue };
        let text = node
            .text()
            .map(collapse)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() { return Some(text); }
    }
    None
}

fn in_boilerplate(el: &ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| BOILERPLATE.contains(&a.value().name()))
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
