/// Suffix rewrites applied, in order, when singularizing a noun.
const SINGULAR_SUFFIXES: &[(&str, &str)] = &[("xies", "xy"), ("tries", "try"), ("ies", "y")];

/// Render `plural_phrase` for `count` items.
///
/// Phrases are written in plural form with the noun right before a trailing
/// participle ("dev apps created"). For a count of one only that noun is
/// singularized; a one-word phrase singularizes its only word.
pub fn pluralize(count: usize, plural_phrase: &str) -> String {
    if count != 1 {
        return plural_phrase.to_string();
    }
    let words: Vec<&str> = plural_phrase.split(' ').collect();
    let noun_index = words.len().saturating_sub(2);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i == noun_index {
                singularize(word)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn singularize(word: &str) -> String {
    for (plural, singular) in SINGULAR_SUFFIXES {
        if let Some(stem) = word.strip_suffix(plural) {
            return format!("{stem}{singular}");
        }
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}
