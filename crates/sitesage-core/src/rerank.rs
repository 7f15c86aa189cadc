//! Pure half of the LLM rerank contract.
//!
//! The model sees the candidates as a numbered list and is told to answer
//! with nothing but a comma-separated permutation of those numbers. Its
//! reply is untrusted text: [`parse_ranking`] pulls out every run of
//! digits, drops anything out of range or repeated, and
//! [`apply_ranking`] turns the surviving numbers into a reordering of the
//! input. Unmentioned candidates keep their relative order after the
//! mentioned ones, so the output is always a permutation of the input.

use std::collections::HashSet;

/// Build the rerank prompt for `query` over `passages` (in current order).
pub fn rerank_prompt(query: &str, passages: &[&str]) -> String {
    let documents = passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {}", i + 1, p))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a ranking assistant. Re-rank the following documents by how useful and relevant they are for answering the user's question.

### User Question:
"{query}"

### Documents:
{documents}

---

### Instructions:
- Read all documents.
- Rank the documents from most relevant to least relevant.
- Output the ranking as a comma-separated list of document numbers.
- Output ONLY the numbers. Do NOT output explanations or any other text.

### Output format (STRICT):
1, 3, 2, 4"#
    )
}

/// Extract 0-based candidate indices from a model reply.
///
/// Every maximal run of ASCII digits is read as a 1-based candidate
/// number. Numbers outside `1..=len`, numbers too large to parse, and
/// repeats are discarded. An empty result means the reply was unusable.
pub fn parse_ranking(response: &str, len: usize) -> Vec<usize> {
    let mut seen = HashSet::new();
    response
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<usize>().ok())
        .filter(|&n| n >= 1 && n <= len)
        .map(|n| n - 1)
        .filter(|&i| seen.insert(i))
        .collect()
}

/// Reorder `items` by `ranking` (0-based, as returned by
/// [`parse_ranking`]). Items not named in `ranking` follow in their
/// original order. An empty `ranking` returns `items` unchanged.
pub fn apply_ranking<T>(items: Vec<T>, ranking: &[usize]) -> Vec<T> {
    if ranking.is_empty() {
        return items;
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());

    for &i in ranking {
        if let Some(item) = slots.get_mut(i).and_then(Option::take) {
            out.push(item);
        }
    }
    out.extend(slots.into_iter().flatten());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_permutation() {
        assert_eq!(parse_ranking("2, 3, 1", 3), vec![1, 2, 0]);
    }

    #[test]
    fn test_parse_tolerates_prose_and_noise() {
        assert_eq!(
            parse_ranking("Sure! The ranking is: 3,1 (then 2).", 3),
            vec![2, 0, 1]
        );
        assert_eq!(parse_ranking("[4]\n[2]", 4), vec![3, 1]);
    }

    #[test]
    fn test_parse_discards_out_of_range_and_repeats() {
        assert_eq!(parse_ranking("0, 2, 9, 2, 1", 3), vec![1, 0]);
        assert_eq!(parse_ranking("99999999999999999999999, 1", 3), vec![0]);
    }

    #[test]
    fn test_parse_no_digits() {
        assert!(parse_ranking("I cannot rank these.", 3).is_empty());
        assert!(parse_ranking("", 3).is_empty());
        assert!(parse_ranking("1, 2", 0).is_empty());
    }

    #[test]
    fn test_apply_full_permutation() {
        assert_eq!(apply_ranking(vec!['a', 'b', 'c'], &[2, 0, 1]), vec!['c', 'a', 'b']);
    }

    #[test]
    fn test_apply_partial_keeps_remaining_order() {
        assert_eq!(
            apply_ranking(vec!['a', 'b', 'c', 'd'], &[2]),
            vec!['c', 'a', 'b', 'd']
        );
    }

    #[test]
    fn test_apply_empty_ranking_is_identity() {
        let input = vec!["x", "y", "z"];
        assert_eq!(apply_ranking(input.clone(), &[]), input);
    }

    #[test]
    fn test_prompt_numbers_passages() {
        let prompt = rerank_prompt("what is ERC?", &["first passage", "second passage"]);
        assert!(prompt.contains("\"what is ERC?\""));
        assert!(prompt.contains("1. first passage\n2. second passage"));
        assert!(prompt.contains("Output ONLY the numbers"));
    }
}
