//! Query normalization before embedding.

const BOILERPLATE: &[&str] = &[
    "can you tell me about",
    "could you tell me",
    "i want to know",
    "tell me about",
    "do you know",
    "what are",
    "what is",
    "please",
];

/// Strip leading interrogative boilerplate and trailing `?`, collapse
/// whitespace. Falls back to the trimmed original when nothing is left.
pub fn preprocess_query(query: &str) -> String {
    let mut rest: String = query.split_whitespace().collect::<Vec<_>>().join(" ");
    while let Some(prefix) = BOILERPLATE.iter().find(|p| starts_with_phrase(&rest, p)) {
        rest = rest[prefix.len()..].trim_start_matches([' ', ',']).to_string();
    }
    let stripped = rest.trim_end_matches(|c: char| c == '?' || c.is_whitespace()).to_string();
    if stripped.is_empty() {
        query.trim().to_string()
    } else {
        stripped
    }
}

/// Case-insensitive ASCII `phrase` at the start of `text`, ending on a word boundary.
fn starts_with_phrase(text: &str, phrase: &str) -> bool {
    text.get(..phrase.len()).is_some_and(|head| head.eq_ignore_ascii_case(phrase))
        && text[phrase.len()..].chars().next().map_or(true, |c| !c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_boilerplate() {
        assert_eq!(preprocess_query("What is the  check-in time?"), "the check-in time");
        assert_eq!(preprocess_query("Please, can you tell me about the spa??"), "the spa");
        assert_eq!(preprocess_query("when does the spa open"), "when does the spa open");
    }

    #[test]
    fn keeps_words_that_only_start_like_boilerplate() {
        assert_eq!(preprocess_query("pleasenton hotels"), "pleasenton hotels");
    }

    #[test]
    fn falls_back_to_original() {
        assert_eq!(preprocess_query("What is?"), "What is?");
        assert_eq!(preprocess_query("   "), "");
    }
}
