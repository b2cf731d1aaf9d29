//! Constraint validation for form controls.
//!
//! Covers what form pages rely on: `required`, email/url type checks,
//! `minlength`/`maxlength`, `pattern`, numeric `min`/`max`/`step` and
//! `setCustomValidity`. Messages use the browser's wording.

use super::*;
use crate::dom::{input_type, is_radio_input};
use crate::pattern::Pattern;

/// Snapshot of the `ValidityState` flags for one control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidityState {
    pub value_missing: bool,
    pub type_mismatch: bool,
    pub pattern_mismatch: bool,
    pub too_long: bool,
    pub too_short: bool,
    pub range_underflow: bool,
    pub range_overflow: bool,
    pub step_mismatch: bool,
    pub bad_input: bool,
    pub custom_error: bool,
    pub valid: bool,
}

impl ValidityState {
    fn always_valid() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    fn finish(mut self) -> Self {
        self.valid = !(self.value_missing
            || self.type_mismatch
            || self.pattern_mismatch
            || self.too_long
            || self.too_short
            || self.range_underflow
            || self.range_overflow
            || self.step_mismatch
            || self.bad_input
            || self.custom_error);
        self
    }
}

/// Disabled controls (directly or through a disabled fieldset) are barred from validation.
pub(crate) fn is_effectively_disabled(dom: &Dom, node: NodeId) -> bool {
    if dom.disabled(node) {
        return true;
    }
    let mut cursor = dom.parent(node);
    while let Some(current) = cursor {
        if dom.has_tag(current, "fieldset") && dom.disabled(current) {
            return true;
        }
        cursor = dom.parent(current);
    }
    false
}

fn input_participates_in_constraint_validation(kind: &str) -> bool {
    !matches!(kind, "button" | "submit" | "reset" | "hidden" | "image")
}

fn input_supports_required(kind: &str) -> bool {
    !matches!(kind, "range" | "color")
}

fn is_text_like(kind: &str) -> bool {
    matches!(kind, "text" | "search" | "url" | "tel" | "email" | "password")
}

pub(crate) fn compute_validity(dom: &Dom, node: NodeId) -> Result<ValidityState> {
    if is_effectively_disabled(dom, node) {
        return Ok(ValidityState::always_valid());
    }

    let mut validity = ValidityState::default();

    if dom.has_tag(node, "textarea") {
        let value = dom.value(node)?;
        if dom.required(node) && !dom.readonly(node) && value.is_empty() {
            validity.value_missing = true;
        }
        check_length(dom, node, &value, &mut validity);
        validity.custom_error = !dom.custom_validity_message(node)?.is_empty();
        return Ok(validity.finish());
    }

    if dom.has_tag(node, "select") {
        validity.value_missing = dom.required(node) && dom.value(node)?.is_empty();
        validity.custom_error = !dom.custom_validity_message(node)?.is_empty();
        return Ok(validity.finish());
    }

    let Some(kind) = input_type(dom, node) else {
        return Ok(ValidityState::always_valid());
    };
    if !input_participates_in_constraint_validation(&kind) {
        return Ok(ValidityState::always_valid());
    }

    let value = dom.value(node)?;
    let multiple = dom.attr(node, "multiple").is_some();
    let email_multiple = kind == "email" && multiple;
    let value_is_empty = if email_multiple {
        value.trim().is_empty()
    } else {
        value.is_empty()
    };

    let required = if kind == "radio" {
        is_radio_group_required(dom, node)
    } else {
        dom.required(node)
    };
    if required && !dom.readonly(node) && input_supports_required(&kind) {
        validity.value_missing = match kind.as_str() {
            "checkbox" => !dom.checked(node)?,
            "radio" => !is_radio_group_checked(dom, node),
            _ => value_is_empty,
        };
    }

    if !value_is_empty {
        if kind == "email" {
            validity.type_mismatch = if email_multiple {
                !is_email_address_list(&value)
            } else {
                !is_simple_email(&value)
            };
        } else if kind == "url" {
            validity.type_mismatch = !is_url_like(&value);
        }

        if is_text_like(&kind) {
            check_length(dom, node, &value, &mut validity);
            check_pattern(dom, node, &value, email_multiple, &mut validity);
        }

        if matches!(kind.as_str(), "number" | "range") {
            check_number(dom, node, &value, &mut validity);
        }
    }

    validity.custom_error = !dom.custom_validity_message(node)?.is_empty();
    Ok(validity.finish())
}

fn utf16_len(value: &str) -> i64 {
    value.encode_utf16().count() as i64
}

fn check_length(dom: &Dom, node: NodeId, value: &str, validity: &mut ValidityState) {
    if value.is_empty() || !dom.is_dirty(node) {
        return;
    }
    let value_len = utf16_len(value);
    if let Some(min_len) = parse_attr_i64(dom, node, "minlength") {
        if min_len >= 0 && value_len < min_len {
            validity.too_short = true;
        }
    }
    if let Some(max_len) = parse_attr_i64(dom, node, "maxlength") {
        if max_len >= 0 && value_len > max_len {
            validity.too_long = true;
        }
    }
}

fn check_pattern(
    dom: &Dom,
    node: NodeId,
    value: &str,
    email_multiple: bool,
    validity: &mut ValidityState,
) {
    let Some(raw) = dom.attr(node, "pattern") else {
        return;
    };
    // An unparsable pattern imposes no constraint.
    let Ok(pattern) = Pattern::new(&raw) else {
        return;
    };

    if email_multiple {
        for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            if let Ok(false) = pattern.is_match(part) {
                validity.pattern_mismatch = true;
                break;
            }
        }
    } else if let Ok(false) = pattern.is_match(value) {
        validity.pattern_mismatch = true;
    }
}

fn check_number(dom: &Dom, node: NodeId, value: &str, validity: &mut ValidityState) {
    let Some(numeric) = parse_number_value(value) else {
        validity.bad_input = true;
        return;
    };

    if let Some(min) = parse_attr_f64(dom, node, "min") {
        if numeric < min {
            validity.range_underflow = true;
        }
    }
    if let Some(max) = parse_attr_f64(dom, node, "max") {
        if numeric > max {
            validity.range_overflow = true;
        }
    }

    if let Some(step) = allowed_step(dom, node) {
        let base = step_base(dom, node);
        let ratio = (numeric - base) / step;
        if (ratio - ratio.round()).abs() > 1e-7 {
            validity.step_mismatch = true;
        }
    }
}

/// `None` when `step="any"`; an invalid or missing step falls back to 1.
fn allowed_step(dom: &Dom, node: NodeId) -> Option<f64> {
    let step_attr = dom.attr(node, "step").unwrap_or_default();
    if step_attr.trim().eq_ignore_ascii_case("any") {
        return None;
    }
    Some(
        step_attr
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or(1.0),
    )
}

fn step_base(dom: &Dom, node: NodeId) -> f64 {
    parse_attr_f64(dom, node, "min")
        .or_else(|| parse_attr_f64(dom, node, "value"))
        .unwrap_or(0.0)
}

fn parse_attr_f64(dom: &Dom, node: NodeId, name: &str) -> Option<f64> {
    dom.attr(node, name).and_then(|raw| parse_number_value(&raw))
}

fn parse_attr_i64(dom: &Dom, node: NodeId, name: &str) -> Option<i64> {
    dom.attr(node, name).and_then(|raw| {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else {
            raw.parse::<i64>().ok()
        }
    })
}

/// Whitespace-trimmed finite float; the empty string is not a number.
pub(crate) fn parse_number_value(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Radios sharing `node`'s name within the same form owner, `node` included.
fn radio_group_members(dom: &Dom, node: NodeId) -> Vec<NodeId> {
    let name = dom.attr(node, "name").unwrap_or_default();
    if name.is_empty() {
        return vec![node];
    }
    let form = dom.find_ancestor_by_tag(node, "form");
    dom.all_element_nodes()
        .into_iter()
        .filter(|candidate| {
            is_radio_input(dom, *candidate)
                && dom.attr(*candidate, "name").unwrap_or_default() == name
                && dom.find_ancestor_by_tag(*candidate, "form") == form
        })
        .collect()
}

fn is_radio_group_checked(dom: &Dom, node: NodeId) -> bool {
    radio_group_members(dom, node)
        .into_iter()
        .any(|member| dom.checked(member).unwrap_or(false))
}

// One required radio makes the whole group required.
fn is_radio_group_required(dom: &Dom, node: NodeId) -> bool {
    radio_group_members(dom, node)
        .into_iter()
        .any(|member| dom.required(member))
}

fn is_ascii_email_local_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '.' | '!'
                | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
                | '-'
        )
}

fn is_valid_email_domain_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    let bytes = label.as_bytes();
    bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

fn is_simple_email(value: &str) -> bool {
    let trimmed = value.trim();
    let Some((local, domain)) = trimmed.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    local.chars().all(is_ascii_email_local_char)
        && domain.split('.').all(is_valid_email_domain_label)
}

fn is_email_address_list(value: &str) -> bool {
    value.trim().is_empty()
        || value
            .split(',')
            .map(str::trim)
            .all(|part| !part.is_empty() && is_simple_email(part))
}

/// Absolute URL check: a scheme, a colon and a non-empty remainder without spaces.
fn is_url_like(value: &str) -> bool {
    let value = value.trim();
    let Some((scheme, rest)) = value.split_once(':') else {
        return false;
    };
    let mut scheme_chars = scheme.chars();
    let scheme_ok = scheme_chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic())
        && scheme_chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'));
    if !scheme_ok || rest.is_empty() || rest.chars().any(char::is_whitespace) {
        return false;
    }
    if matches!(
        scheme.to_ascii_lowercase().as_str(),
        "http" | "https" | "ftp" | "ws" | "wss"
    ) {
        return rest
            .strip_prefix("//")
            .is_some_and(|authority| !authority.is_empty() && !authority.starts_with('/'));
    }
    true
}

pub(crate) fn check_validity(dom: &Dom, node: NodeId) -> Result<bool> {
    Ok(compute_validity(dom, node)?.valid)
}

/// Checks the control and surfaces its message, like `reportValidity()`.
pub(crate) fn report_validity(dom: &mut Dom, node: NodeId) -> Result<bool> {
    let validity = compute_validity(dom, node)?;
    let message = if validity.valid {
        None
    } else {
        Some(message_for(dom, node, &validity)?)
    };
    dom.set_reported_message(node, message)?;
    Ok(validity.valid)
}

/// The `validationMessage` of a control; empty when valid.
pub(crate) fn validation_message(dom: &Dom, node: NodeId) -> Result<String> {
    let validity = compute_validity(dom, node)?;
    if validity.valid {
        return Ok(String::new());
    }
    message_for(dom, node, &validity)
}

fn message_for(dom: &Dom, node: NodeId, validity: &ValidityState) -> Result<String> {
    if validity.custom_error {
        return dom.custom_validity_message(node);
    }

    let kind = input_type(dom, node).unwrap_or_default();
    let value = dom.value(node)?;

    let message = if validity.value_missing {
        if dom.has_tag(node, "select") {
            "Please select an item in the list.".to_string()
        } else {
            match kind.as_str() {
                "checkbox" => "Please check this box if you want to proceed.".to_string(),
                "radio" => "Please select one of these options.".to_string(),
                "file" => "Please select a file.".to_string(),
                _ => "Please fill out this field.".to_string(),
            }
        }
    } else if validity.type_mismatch {
        if kind == "email" {
            if value.contains('@') {
                format!("Please enter a valid email address. '{value}' is not valid.")
            } else {
                format!("Please include an '@' in the email address. '{value}' is missing an '@'.")
            }
        } else {
            "Please enter a URL.".to_string()
        }
    } else if validity.bad_input {
        "Please enter a number.".to_string()
    } else if validity.too_long {
        let max = parse_attr_i64(dom, node, "maxlength").unwrap_or_default();
        format!(
            "Please shorten this text to {max} characters or less (you are currently using {} characters).",
            utf16_len(&value)
        )
    } else if validity.too_short {
        let min = parse_attr_i64(dom, node, "minlength").unwrap_or_default();
        format!(
            "Please lengthen this text to {min} characters or more (you are currently using {} characters).",
            utf16_len(&value)
        )
    } else if validity.range_underflow {
        let min = parse_attr_f64(dom, node, "min").unwrap_or_default();
        format!("Value must be greater than or equal to {min}.")
    } else if validity.range_overflow {
        let max = parse_attr_f64(dom, node, "max").unwrap_or_default();
        format!("Value must be less than or equal to {max}.")
    } else if validity.step_mismatch {
        step_mismatch_message(dom, node, &value)
    } else if validity.pattern_mismatch {
        match dom.attr(node, "title").filter(|title| !title.is_empty()) {
            Some(title) => format!("Please match the requested format.\n{title}"),
            None => "Please match the requested format.".to_string(),
        }
    } else {
        "Please enter a valid value.".to_string()
    };
    Ok(message)
}

fn step_mismatch_message(dom: &Dom, node: NodeId, value: &str) -> String {
    let (Some(numeric), Some(step)) = (parse_number_value(value), allowed_step(dom, node)) else {
        return "Please enter a valid value.".to_string();
    };
    let base = step_base(dom, node);
    let below = base + ((numeric - base) / step).floor() * step;
    let above = below + step;
    format!("Please enter a valid value. The two nearest valid values are {below} and {above}.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_html;

    fn node(dom: &Dom, id: &str) -> NodeId {
        dom.by_id(id)
            .unwrap_or_else(|| panic!("fixture is missing #{id}"))
    }

    #[test]
    fn required_text_checkbox_radio_and_select_report_value_missing() -> Result<()> {
        let dom = parse_html(
            r#"
            <form>
              <input id='name' required>
              <input id='agree' type='checkbox' required>
              <input id='r1' type='radio' name='gender' required>
              <input id='r2' type='radio' name='gender'>
              <select id='age' required><option value=''>Choose</option><option>18-24</option></select>
              <textarea id='notes' required></textarea>
            </form>
            "#,
        )?;

        for (id, message) in [
            ("name", "Please fill out this field."),
            ("agree", "Please check this box if you want to proceed."),
            ("r1", "Please select one of these options."),
            ("age", "Please select an item in the list."),
            ("notes", "Please fill out this field."),
        ] {
            let validity = compute_validity(&dom, node(&dom, id))?;
            assert!(validity.value_missing, "#{id} should be missing");
            assert!(!validity.valid);
            assert_eq!(validation_message(&dom, node(&dom, id))?, message);
        }
        Ok(())
    }

    #[test]
    fn checking_any_radio_in_group_satisfies_required() -> Result<()> {
        let mut dom = parse_html(
            r#"
            <form>
              <input id='r1' type='radio' name='gender' required>
              <input id='r2' type='radio' name='gender'>
            </form>
            <form><input id='other' type='radio' name='gender' checked></form>
            "#,
        )?;
        assert!(!check_validity(&dom, node(&dom, "r1"))?);

        dom.set_checked(node(&dom, "r2"), true)?;
        assert!(check_validity(&dom, node(&dom, "r1"))?);
        Ok(())
    }

    #[test]
    fn every_radio_in_a_required_group_is_missing_until_one_is_checked() -> Result<()> {
        let mut dom = parse_html(
            r#"
            <form>
              <input id='a' type='radio' name='ethnicity' value='W' required>
              <input id='b' type='radio' name='ethnicity' value='NS'>
            </form>
            <form><input id='elsewhere' type='radio' name='ethnicity'></form>
            "#,
        )?;
        let b = node(&dom, "b");
        assert!(compute_validity(&dom, b)?.value_missing);
        assert_eq!(
            validation_message(&dom, b)?,
            "Please select one of these options."
        );
        assert!(check_validity(&dom, node(&dom, "elsewhere"))?);

        dom.set_checked(node(&dom, "a"), true)?;
        assert!(check_validity(&dom, b)?);
        Ok(())
    }

    #[test]
    fn disabled_readonly_and_hidden_controls_are_barred() -> Result<()> {
        let dom = parse_html(
            r#"
            <input id='disabled' required disabled>
            <fieldset disabled><input id='in-fieldset' required></fieldset>
            <input id='readonly' required readonly>
            <input id='hidden' type='hidden' required>
            <button id='button' required></button>
            "#,
        )?;
        for id in ["disabled", "in-fieldset", "readonly", "hidden", "button"] {
            assert!(check_validity(&dom, node(&dom, id))?, "#{id} should be valid");
        }
        Ok(())
    }

    #[test]
    fn email_and_url_type_mismatch() -> Result<()> {
        let mut dom = parse_html(
            r#"
            <input id='email' type='email'>
            <input id='emails' type='email' multiple>
            <input id='url' type='url'>
            "#,
        )?;
        let email = node(&dom, "email");
        let emails = node(&dom, "emails");
        let url = node(&dom, "url");

        dom.set_value(email, "someone")?;
        assert!(compute_validity(&dom, email)?.type_mismatch);
        assert_eq!(
            validation_message(&dom, email)?,
            "Please include an '@' in the email address. 'someone' is missing an '@'."
        );
        dom.set_value(email, "someone@example.org")?;
        assert!(check_validity(&dom, email)?);

        dom.set_value(emails, "a@example.org, b@example")?;
        assert!(check_validity(&dom, emails)?);
        dom.set_value(emails, "a@example.org,,b@example.org")?;
        assert!(!check_validity(&dom, emails)?);

        dom.set_value(url, "example.org")?;
        assert_eq!(validation_message(&dom, url)?, "Please enter a URL.");
        dom.set_value(url, "https://example.org/form")?;
        assert!(check_validity(&dom, url)?);
        dom.set_value(url, "mailto:team@example.org")?;
        assert!(check_validity(&dom, url)?);
        Ok(())
    }

    #[test]
    fn length_constraints_apply_only_to_dirty_values() -> Result<()> {
        let mut dom = parse_html(
            r#"
            <input id='short' minlength='3' value='ab'>
            <textarea id='long' maxlength='4'>hello</textarea>
            "#,
        )?;
        let short = node(&dom, "short");
        let long = node(&dom, "long");
        assert!(check_validity(&dom, short)?);
        assert!(check_validity(&dom, long)?);

        dom.mark_dirty(short)?;
        dom.mark_dirty(long)?;
        assert!(compute_validity(&dom, short)?.too_short);
        assert!(compute_validity(&dom, long)?.too_long);
        assert_eq!(
            validation_message(&dom, long)?,
            "Please shorten this text to 4 characters or less (you are currently using 5 characters)."
        );

        dom.set_value(short, "\u{1F600}x")?;
        assert!(check_validity(&dom, short)?, "astral chars count as two code units");
        Ok(())
    }

    #[test]
    fn pattern_mismatch_uses_title_hint() -> Result<()> {
        let mut dom = parse_html(
            r#"
            <input id='postcode' pattern='[A-Z]{2}[0-9]+' title='Two letters then digits'>
            <input id='broken' pattern='('>
            "#,
        )?;
        let postcode = node(&dom, "postcode");
        dom.set_value(postcode, "ab12")?;
        assert!(compute_validity(&dom, postcode)?.pattern_mismatch);
        assert_eq!(
            validation_message(&dom, postcode)?,
            "Please match the requested format.\nTwo letters then digits"
        );
        dom.set_value(postcode, "AB12")?;
        assert!(check_validity(&dom, postcode)?);

        let broken = node(&dom, "broken");
        dom.set_value(broken, "anything")?;
        assert!(check_validity(&dom, broken)?);
        Ok(())
    }

    #[test]
    fn number_range_step_and_bad_input() -> Result<()> {
        let mut dom = parse_html("<input id='n' type='number' min='18' max='100' step='2'>")?;
        let n = node(&dom, "n");

        dom.set_value(n, "17")?;
        let validity = compute_validity(&dom, n)?;
        assert!(validity.range_underflow);
        assert!(validity.step_mismatch);
        assert_eq!(
            validation_message(&dom, n)?,
            "Value must be greater than or equal to 18."
        );

        dom.set_value(n, "102")?;
        assert_eq!(
            validation_message(&dom, n)?,
            "Value must be less than or equal to 100."
        );

        dom.set_value(n, "21")?;
        assert_eq!(
            validation_message(&dom, n)?,
            "Please enter a valid value. The two nearest valid values are 20 and 22."
        );

        dom.set_value(n, "abc")?;
        assert!(compute_validity(&dom, n)?.bad_input);
        assert_eq!(validation_message(&dom, n)?, "Please enter a number.");

        dom.set_value(n, " 40 ")?;
        assert!(check_validity(&dom, n)?);
        Ok(())
    }

    #[test]
    fn custom_validity_message_takes_priority_and_can_be_cleared() -> Result<()> {
        let mut dom = parse_html("<input id='age' required>")?;
        let age = node(&dom, "age");

        dom.set_custom_validity_message(age, "Must be 18-100")?;
        let validity = compute_validity(&dom, age)?;
        assert!(validity.custom_error && validity.value_missing);
        assert_eq!(validation_message(&dom, age)?, "Must be 18-100");

        assert!(!report_validity(&mut dom, age)?);
        assert_eq!(dom.reported_message(age)?.as_deref(), Some("Must be 18-100"));

        dom.set_custom_validity_message(age, "")?;
        dom.set_value(age, "30")?;
        assert!(report_validity(&mut dom, age)?);
        assert_eq!(dom.reported_message(age)?, None);
        Ok(())
    }

    #[test]
    fn parse_number_value_rejects_empty_and_non_finite() {
        assert_eq!(parse_number_value(" 18 "), Some(18.0));
        assert_eq!(parse_number_value("1e2"), Some(100.0));
        assert_eq!(parse_number_value(""), None);
        assert_eq!(parse_number_value("   "), None);
        assert_eq!(parse_number_value("inf"), None);
        assert_eq!(parse_number_value("NaN"), None);
        assert_eq!(parse_number_value("18-24"), None);
    }
}
