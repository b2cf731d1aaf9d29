/// Compiled `pattern` attribute, anchored to the whole value like the browser does.
#[derive(Debug, Clone)]
pub(crate) struct Pattern {
    backend: fancy_regex::Regex,
}

impl Pattern {
    pub(crate) fn new(pattern: &str) -> Result<Self, PatternError> {
        let wrapped = format!("^(?:{pattern})$");
        let backend = fancy_regex::Regex::new(&wrapped).map_err(PatternError::from)?;
        Ok(Self { backend })
    }

    pub(crate) fn is_match(&self, input: &str) -> Result<bool, PatternError> {
        self.backend.is_match(input).map_err(PatternError::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub(crate) struct PatternError {
    message: String,
}

impl From<fancy_regex::Error> for PatternError {
    fn from(value: fancy_regex::Error) -> Self {
        Self {
            message: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_is_anchored_to_whole_value() -> Result<(), PatternError> {
        let postcode = Pattern::new("[A-Z]{1,2}[0-9][A-Z0-9]? ?[0-9][A-Z]{2}")?;
        assert!(postcode.is_match("SW1A 1AA")?);
        assert!(!postcode.is_match("xSW1A 1AA")?);
        assert!(!postcode.is_match("SW1A 1AAx")?);
        Ok(())
    }

    #[test]
    fn alternation_does_not_escape_anchors() -> Result<(), PatternError> {
        let pattern = Pattern::new("yes|no")?;
        assert!(pattern.is_match("no")?);
        assert!(!pattern.is_match("nope")?);
        Ok(())
    }

    #[test]
    fn lookaround_patterns_are_supported() -> Result<(), PatternError> {
        let pattern = Pattern::new("(?=.*[0-9]).{4,}")?;
        assert!(pattern.is_match("abc1")?);
        assert!(!pattern.is_match("abcd")?);
        Ok(())
    }

    #[test]
    fn invalid_pattern_reports_error() {
        let err = Pattern::new("(").expect_err("unbalanced group must fail");
        let backend = fancy_regex::Regex::new("^(?:()$").expect_err("backend rejects it too");
        assert_eq!(err.to_string(), backend.to_string());
    }
}
