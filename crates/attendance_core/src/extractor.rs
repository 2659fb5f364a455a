//! crates/attendance_core/src/extractor.rs
//!
//! Pulls candidate member names out of pasted free text (chat logs, scanned paper
//! rosters). Pure functions with no side effects.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Words that look like names to the pattern scan but are attendance vocabulary.
pub const STOPWORDS: [&str; 14] = [
    "출석", "결석", "지각", "오전", "오후", "저녁", "요일", "명단", "확인", "선생님", "수업",
    "체크", "이름", "번호",
];

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[가-힣]{2,4}").expect("name pattern is a valid regex"))
}

pub fn is_stopword(candidate: &str) -> bool {
    STOPWORDS.contains(&candidate)
}

/// Extracts runs of 2 to 4 Hangul syllables, in first-occurrence order, without
/// duplicates or stopwords.
pub fn extract_names(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    name_pattern()
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|candidate| !is_stopword(candidate))
        .filter(|candidate| seen.insert(*candidate))
        .map(str::to_string)
        .collect()
}

/// Removes every whitespace character, so names split by stray spaces or line
/// breaks still match as substrings.
pub fn normalize(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_names_and_drops_stopwords() {
        assert_eq!(
            extract_names("김민수 이영희 출석 확인"),
            vec!["김민수".to_string(), "이영희".to_string()]
        );
    }

    #[test]
    fn deduplicates_keeping_first_occurrence() {
        let names = extract_names("박지성, 김연아\n박지성 (지각)\n손흥민 김연아");
        assert_eq!(names, vec!["박지성", "김연아", "손흥민"]);
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(extract_names("").is_empty());
        assert!(extract_names(" \n\t ").is_empty());
    }

    #[test]
    fn ignores_single_syllables_and_latin_text() {
        assert!(extract_names("a b c 김 John 3명").is_empty());
    }

    #[test]
    fn long_runs_are_split_greedily() {
        // Five syllables: the first four form a candidate, the fifth is dropped.
        assert_eq!(extract_names("가나다라마"), vec!["가나다라"]);
        assert_eq!(extract_names("가나다라마바"), vec!["가나다라", "마바"]);
    }

    #[test]
    fn normalize_strips_all_whitespace() {
        assert_eq!(normalize("김 민수\n 이영희\t"), "김민수이영희");
    }
}
