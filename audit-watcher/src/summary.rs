use crate::enricher::EnrichedGroup;
use crate::pluralize::pluralize;

/// Compose the elaboration text: a count line per group, each followed by the
/// group's detail lines. Empty when nothing was classified.
pub fn build_elaboration(groups: &[EnrichedGroup]) -> String {
    let mut text = String::new();
    for group in groups {
        text.push_str(&format!(
            "{} {}\n",
            group.count,
            pluralize(group.count, &group.plural_phrase)
        ));
        for line in group.details.iter().filter(|l| !l.is_empty()) {
            text.push_str(line);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(phrase: &str, count: usize, details: &[&str]) -> EnrichedGroup {
        EnrichedGroup {
            plural_phrase: phrase.to_string(),
            count,
            details: details.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn empty_input_gives_empty_text() {
        assert_eq!(build_elaboration(&[]), "");
    }

    #[test]
    fn counts_then_details_in_order() {
        let groups = vec![
            group("dev apps created", 1, &["\u{2022} a1 (dev:d1 user:u)\n"]),
            group(
                "APIs deleted",
                2,
                &["\u{2022} p1 (user:u)\n", "", "\u{2022} p2 (user:u)\n"],
            ),
            group("Trace sessions created", 3, &[]),
        ];
        assert_eq!(
            build_elaboration(&groups),
            "1 dev app created\n\
             \u{2022} a1 (dev:d1 user:u)\n\
             2 APIs deleted\n\
             \u{2022} p1 (user:u)\n\
             \u{2022} p2 (user:u)\n\
             3 Trace sessions created\n"
        );
    }
}
