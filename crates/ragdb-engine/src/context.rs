//! Grounding-text assembly for downstream prompts.
//!
//! Documents are grouped by `category` in order of first appearance, each
//! group under a `## <Category>` header, one bullet per document tagged with
//! its source. The block never exceeds `max_chars`: documents that would
//! overflow are skipped, except the first, which is truncated to fit.

use ragdb_core::ScoredDocument;

fn title_case(category: &str) -> String {
    category
        .split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |c| c.to_uppercase().chain(chars).collect())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn bullet(doc: &ScoredDocument) -> String {
    match doc.document.source() {
        Some(source) => format!("- {} (source: {source})", doc.document.content),
        None => format!("- {}", doc.document.content),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max < 3 {
        return s.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

pub fn assemble_context(documents: &[ScoredDocument], max_chars: usize) -> String {
    let mut groups: Vec<(&str, Vec<&ScoredDocument>)> = Vec::new();
    for doc in documents {
        let category = doc.document.category();
        match groups.iter_mut().find(|(c, _)| *c == category) {
            Some((_, members)) => members.push(doc),
            None => groups.push((category, vec![doc])),
        }
    }

    let mut out = String::new();
    let mut used = 0usize;
    let mut first = true;
    for (category, members) in groups {
        let header = format!("## {}\n", title_case(category));
        let mut header_written = false;
        for doc in members {
            let line = format!("{}\n", bullet(doc));
            let separator = usize::from(!out.is_empty() && !header_written);
            let needed = line.chars().count() + if header_written { 0 } else { header.chars().count() + separator };
            if used + needed > max_chars {
                if !first {
                    continue;
                }
                // the best document is always included, cut to the budget
                let room = max_chars.saturating_sub(header.chars().count());
                out.push_str(&header);
                out.push_str(&truncate_chars(line.trim_end(), room));
                return truncate_chars(&out, max_chars);
            }
            if !header_written {
                if separator == 1 {
                    out.push('\n');
                }
                out.push_str(&header);
                header_written = true;
            }
            out.push_str(&line);
            used += needed;
            first = false;
        }
    }
    out.trim_end().to_string()
}
