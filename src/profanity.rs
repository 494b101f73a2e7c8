use regex::{Regex, RegexBuilder};

/// Whole-word, case-insensitive match against a configured word list.
#[derive(Debug, Clone)]
pub struct ProfanityFilter {
    re: Option<Regex>,
}

impl ProfanityFilter {
    pub fn new<S: AsRef<str>>(words: &[S]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = words
            .iter()
            .map(|w| w.as_ref().trim())
            .filter(|w| !w.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { re: None });
        }
        let re = RegexBuilder::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
            .case_insensitive(true)
            .build()?;
        Ok(Self { re: Some(re) })
    }

    pub fn is_enabled(&self) -> bool {
        self.re.is_some()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.re.as_ref().is_some_and(|re| re.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_words_only() {
        let f = ProfanityFilter::new(&["блин", "жесть"]).unwrap();
        assert!(f.is_match("ну блин, опять"));
        assert!(f.is_match("БЛИН"));
        assert!(f.is_match("это Жесть"));
        assert!(!f.is_match("блины с мёдом"));
        assert!(!f.is_match("всё хорошо"));
    }

    #[test]
    fn test_special_characters_are_literal() {
        let f = ProfanityFilter::new(&["c++", "a.b"]).unwrap();
        assert!(f.is_match("a.b"));
        assert!(!f.is_match("axb"));
    }

    #[test]
    fn test_empty_list_disables_filter() {
        let f = ProfanityFilter::new::<&str>(&[]).unwrap();
        assert!(!f.is_enabled());
        assert!(!f.is_match("что угодно"));
        let f = ProfanityFilter::new(&["  "]).unwrap();
        assert!(!f.is_enabled());
    }
}
