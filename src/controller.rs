use super::*;
use crate::selector::parse_selector_groups;
use crate::validity::{parse_number_value, report_validity};

/// Numeric bounds enforced on a named field before a page may be left.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeRule {
    pub field_name: String,
    pub min: f64,
    pub max: f64,
    pub message: String,
}

impl Default for AgeRule {
    fn default() -> Self {
        Self {
            field_name: "age".to_string(),
            min: 18.0,
            max: 100.0,
            message: "Must be 18-100".to_string(),
        }
    }
}

impl AgeRule {
    /// Empty and non-numeric values are rejected along with out-of-range ones.
    pub fn accepts(&self, raw: &str) -> bool {
        parse_number_value(raw).is_some_and(|value| value >= self.min && value <= self.max)
    }
}

/// Where the controller finds its pages and controls, and which extra rule it applies.
#[derive(Debug, Clone, PartialEq)]
pub struct FormConfig {
    pub section_selector: String,
    pub progress_selector: String,
    pub prev_selector: String,
    pub next_selector: String,
    pub submit_selector: String,
    pub age_rule: Option<AgeRule>,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            section_selector: ".question-section".to_string(),
            progress_selector: "#formProgress".to_string(),
            prev_selector: ".prev-btn".to_string(),
            next_selector: ".next-btn".to_string(),
            submit_selector: ".submit-btn".to_string(),
            age_rule: Some(AgeRule::default()),
        }
    }
}

impl FormConfig {
    pub fn with_section_selector(mut self, selector: impl Into<String>) -> Self {
        self.section_selector = selector.into();
        self
    }

    pub fn with_progress_selector(mut self, selector: impl Into<String>) -> Self {
        self.progress_selector = selector.into();
        self
    }

    pub fn with_prev_selector(mut self, selector: impl Into<String>) -> Self {
        self.prev_selector = selector.into();
        self
    }

    pub fn with_next_selector(mut self, selector: impl Into<String>) -> Self {
        self.next_selector = selector.into();
        self
    }

    pub fn with_submit_selector(mut self, selector: impl Into<String>) -> Self {
        self.submit_selector = selector.into();
        self
    }

    pub fn with_age_rule(mut self, rule: Option<AgeRule>) -> Self {
        self.age_rule = rule;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (role, selector) in self.selectors() {
            if selector.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{role} selector is empty")));
            }
            if parse_selector_groups(selector).is_err() {
                return Err(Error::InvalidConfig(format!(
                    "{role} selector is not supported: {selector}"
                )));
            }
        }

        if let Some(rule) = &self.age_rule {
            if rule.field_name.is_empty() {
                return Err(Error::InvalidConfig("age rule needs a field name".into()));
            }
            if !(rule.min.is_finite() && rule.max.is_finite()) || rule.min > rule.max {
                return Err(Error::InvalidConfig(format!(
                    "age rule bounds are invalid: {}..={}",
                    rule.min, rule.max
                )));
            }
            // An empty custom message would not mark the field invalid.
            if rule.message.is_empty() {
                return Err(Error::InvalidConfig("age rule needs a message".into()));
            }
        }
        Ok(())
    }

    fn selectors(&self) -> [(&'static str, &str); 5] {
        [
            ("section", self.section_selector.as_str()),
            ("progress", self.progress_selector.as_str()),
            ("previous", self.prev_selector.as_str()),
            ("next", self.next_selector.as_str()),
            ("submit", self.submit_selector.as_str()),
        ]
    }
}

/// Navigation control state derived from the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub previous_disabled: bool,
    pub next_disabled: bool,
    pub submit_visible: bool,
}

impl ControlState {
    pub fn for_page(current_page: usize, page_count: usize) -> Self {
        let last = page_count.saturating_sub(1);
        Self {
            previous_disabled: current_page == 0,
            next_disabled: current_page == last,
            submit_visible: current_page == last,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Moved { from: usize, to: usize },
    /// The current page failed validation; lists the offending fields.
    Blocked { invalid: Vec<String> },
    /// Already on the last page (advance) or the first page (retreat).
    AtBoundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlRole {
    Previous,
    Next,
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageValidation {
    pub(crate) valid: bool,
    pub(crate) invalid: Vec<String>,
}

/// Shows one question section at a time and walks between them.
#[derive(Debug, Clone)]
pub struct PagedFormController {
    config: FormConfig,
    pages: Vec<NodeId>,
    progress: NodeId,
    prev: NodeId,
    next: NodeId,
    submit: NodeId,
    current_page: usize,
}

impl PagedFormController {
    pub(crate) fn initialize(dom: &mut Dom, config: FormConfig) -> Result<Self> {
        config.validate()?;

        let pages = dom.query_selector_all(&config.section_selector)?;
        if pages.is_empty() {
            return Err(Error::NoPages(config.section_selector.clone()));
        }
        let progress = require_element(dom, "progress", &config.progress_selector)?;
        let prev = require_element(dom, "previous", &config.prev_selector)?;
        let next = require_element(dom, "next", &config.next_selector)?;
        let submit = require_element(dom, "submit", &config.submit_selector)?;

        let controller = Self {
            config,
            pages,
            progress,
            prev,
            next,
            submit,
            current_page: 0,
        };

        for index in 0..controller.pages.len() {
            controller.set_page_visible(dom, index, index == 0)?;
        }
        controller.sync_controls(dom)?;

        tracing::debug!(pages = controller.pages.len(), "paged form initialized");
        Ok(controller)
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_first_page(&self) -> bool {
        self.current_page == 0
    }

    pub fn is_last_page(&self) -> bool {
        self.current_page + 1 == self.pages.len()
    }

    pub fn controls(&self) -> ControlState {
        ControlState::for_page(self.current_page, self.pages.len())
    }

    pub fn progress_percent(&self) -> f64 {
        ((self.current_page + 1) as f64 / self.pages.len() as f64) * 100.0
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub(crate) fn role_of(&self, dom: &Dom, target: NodeId) -> Option<ControlRole> {
        [
            (self.prev, ControlRole::Previous),
            (self.next, ControlRole::Next),
            (self.submit, ControlRole::Submit),
        ]
        .into_iter()
        .find(|(control, _)| *control == target || dom.is_descendant_of(target, *control))
        .map(|(_, role)| role)
    }

    /// Checks every field of `page`, surfacing the message of each invalid one.
    pub(crate) fn validate_page(&self, dom: &mut Dom, page: usize) -> Result<PageValidation> {
        let page_node = *self
            .pages
            .get(page)
            .ok_or_else(|| Error::Dom(format!("page {page} is out of range")))?;

        let age_check = match &self.config.age_rule {
            Some(rule) => self
                .apply_age_rule(dom, page_node, rule)?
                .map(|(node, accepted)| (node, accepted, rule.message.as_str())),
            None => None,
        };

        let controls = dom.query_selector_all_from(page_node, "input, select, textarea")?;
        let mut invalid = Vec::new();
        for control in &controls {
            if !report_validity(dom, *control)? {
                push_label(&mut invalid, field_label(dom, *control));
            }
        }

        if let Some((age, accepted, message)) = age_check {
            // Barred controls (hidden, disabled) still fail the rule.
            if !accepted {
                dom.set_reported_message(age, Some(message.to_string()))?;
                push_label(&mut invalid, field_label(dom, age));
            } else if !controls.contains(&age) && !report_validity(dom, age)? {
                push_label(&mut invalid, field_label(dom, age));
            }
        }

        Ok(PageValidation {
            valid: invalid.is_empty(),
            invalid,
        })
    }

    /// Sets or clears the rule's custom message on the page's age field, if it has one.
    /// Returns the field and whether its value was accepted.
    fn apply_age_rule(
        &self,
        dom: &mut Dom,
        page_node: NodeId,
        rule: &AgeRule,
    ) -> Result<Option<(NodeId, bool)>> {
        let mut descendants = Vec::new();
        dom.collect_elements_descendants_dfs(page_node, &mut descendants);
        let Some(age) = descendants
            .into_iter()
            .find(|node| dom.attr(*node, "name").as_deref() == Some(rule.field_name.as_str()))
        else {
            return Ok(None);
        };

        let accepted = rule.accepts(&dom.value(age)?);
        if !accepted {
            dom.set_custom_validity_message(age, &rule.message)?;
        } else if dom.custom_validity_message(age)? == rule.message {
            dom.set_custom_validity_message(age, "")?;
        }
        Ok(Some((age, accepted)))
    }

    pub(crate) fn advance(&mut self, dom: &mut Dom) -> Result<NavigationOutcome> {
        if self.is_last_page() {
            return Ok(NavigationOutcome::AtBoundary);
        }

        let validation = self.validate_page(dom, self.current_page)?;
        if !validation.valid {
            tracing::debug!(
                page = self.current_page,
                invalid = ?validation.invalid,
                "advance blocked by validation"
            );
            return Ok(NavigationOutcome::Blocked {
                invalid: validation.invalid,
            });
        }

        let from = self.current_page;
        self.move_to(dom, from + 1)?;
        Ok(NavigationOutcome::Moved {
            from,
            to: self.current_page,
        })
    }

    pub(crate) fn retreat(&mut self, dom: &mut Dom) -> Result<NavigationOutcome> {
        if self.is_first_page() {
            return Ok(NavigationOutcome::AtBoundary);
        }

        let from = self.current_page;
        self.move_to(dom, from - 1)?;
        Ok(NavigationOutcome::Moved {
            from,
            to: self.current_page,
        })
    }

    fn move_to(&mut self, dom: &mut Dom, target: usize) -> Result<()> {
        self.set_page_visible(dom, self.current_page, false)?;
        let from = self.current_page;
        self.current_page = target;
        self.set_page_visible(dom, self.current_page, true)?;
        self.sync_controls(dom)?;
        tracing::debug!(from, to = target, "paged form moved");
        Ok(())
    }

    fn set_page_visible(&self, dom: &mut Dom, index: usize, visible: bool) -> Result<()> {
        dom.style_set(
            self.pages[index],
            "display",
            if visible { "block" } else { "none" },
        )
    }

    fn sync_controls(&self, dom: &mut Dom) -> Result<()> {
        let controls = self.controls();
        dom.set_disabled(self.prev, controls.previous_disabled)?;
        dom.set_disabled(self.next, controls.next_disabled)?;
        dom.style_set(
            self.submit,
            "display",
            if controls.submit_visible { "block" } else { "none" },
        )?;
        dom.style_set(
            self.progress,
            "width",
            &format!("{}%", self.progress_percent()),
        )
    }
}

fn require_element(dom: &Dom, role: &str, selector: &str) -> Result<NodeId> {
    dom.query_selector(selector)?
        .ok_or_else(|| Error::MissingElement {
            role: role.to_string(),
            selector: selector.to_string(),
        })
}

// Radio groups share a name; list each field once.
fn push_label(invalid: &mut Vec<String>, label: String) {
    if !invalid.contains(&label) {
        invalid.push(label);
    }
}

/// `name`, then `#id`, then the tag name.
pub(crate) fn field_label(dom: &Dom, node: NodeId) -> String {
    if let Some(name) = dom.attr(node, "name").filter(|name| !name.is_empty()) {
        return name;
    }
    if let Some(id) = dom.attr(node, "id").filter(|id| !id.is_empty()) {
        return format!("#{id}");
    }
    dom.tag_name(node)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("node-{}", node.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_html;

    const THREE_PAGES: &str = r#"
    <form>
      <div id="formProgress"></div>
      <section class="question-section" id="p0"><input name="nickname"></section>
      <section class="question-section" id="p1"><input name="age" type="number"></section>
      <section class="question-section" id="p2"><textarea name="comments" required></textarea></section>
      <button type="button" class="prev-btn">Back</button>
      <button type="button" class="next-btn">Next</button>
      <button type="submit" class="submit-btn">Send</button>
    </form>
    "#;

    fn display_of(dom: &Dom, id: &str) -> Result<String> {
        let node = dom
            .by_id(id)
            .ok_or_else(|| Error::SelectorNotFound(format!("#{id}")))?;
        dom.style_get(node, "display")
    }

    #[test]
    fn initialize_shows_first_page_and_derives_controls() -> Result<()> {
        let mut dom = parse_html(THREE_PAGES)?;
        let controller = PagedFormController::initialize(&mut dom, FormConfig::default())?;

        assert_eq!(controller.current_page(), 0);
        assert_eq!(controller.page_count(), 3);
        assert_eq!(display_of(&dom, "p0")?, "block");
        assert_eq!(display_of(&dom, "p1")?, "none");
        assert_eq!(display_of(&dom, "p2")?, "none");
        assert_eq!(
            controller.controls(),
            ControlState {
                previous_disabled: true,
                next_disabled: false,
                submit_visible: false,
            }
        );
        assert!(dom.disabled(controller.prev));
        assert!(!dom.disabled(controller.next));
        assert_eq!(dom.style_get(controller.submit, "display")?, "none");
        assert_eq!(dom.style_get(controller.progress, "width")?, "33.33333333333333%");
        Ok(())
    }

    #[test]
    fn control_state_for_single_page_enables_submit_immediately() {
        assert_eq!(
            ControlState::for_page(0, 1),
            ControlState {
                previous_disabled: true,
                next_disabled: true,
                submit_visible: true,
            }
        );
    }

    #[test]
    fn advance_validates_and_retreat_does_not() -> Result<()> {
        let mut dom = parse_html(THREE_PAGES)?;
        let mut controller = PagedFormController::initialize(&mut dom, FormConfig::default())?;

        assert_eq!(
            controller.advance(&mut dom)?,
            NavigationOutcome::Moved { from: 0, to: 1 }
        );
        assert_eq!(
            controller.advance(&mut dom)?,
            NavigationOutcome::Blocked {
                invalid: vec!["age".to_string()]
            }
        );
        assert_eq!(controller.current_page(), 1);

        let age = dom
            .query_selector("[name='age']")?
            .ok_or_else(|| Error::SelectorNotFound("age".into()))?;
        assert_eq!(dom.reported_message(age)?.as_deref(), Some("Must be 18-100"));

        assert_eq!(
            controller.retreat(&mut dom)?,
            NavigationOutcome::Moved { from: 1, to: 0 }
        );
        assert_eq!(controller.retreat(&mut dom)?, NavigationOutcome::AtBoundary);
        assert_eq!(display_of(&dom, "p0")?, "block");
        assert_eq!(display_of(&dom, "p1")?, "none");
        Ok(())
    }

    #[test]
    fn corrected_age_clears_custom_message() -> Result<()> {
        let mut dom = parse_html(THREE_PAGES)?;
        let mut controller = PagedFormController::initialize(&mut dom, FormConfig::default())?;
        controller.advance(&mut dom)?;

        let age = dom
            .query_selector("[name='age']")?
            .ok_or_else(|| Error::SelectorNotFound("age".into()))?;
        dom.set_value(age, "101")?;
        assert!(matches!(
            controller.advance(&mut dom)?,
            NavigationOutcome::Blocked { .. }
        ));

        dom.set_value(age, "100")?;
        assert_eq!(
            controller.advance(&mut dom)?,
            NavigationOutcome::Moved { from: 1, to: 2 }
        );
        assert_eq!(dom.custom_validity_message(age)?, "");
        assert_eq!(controller.advance(&mut dom)?, NavigationOutcome::AtBoundary);
        assert!(controller.is_last_page());
        Ok(())
    }

    #[test]
    fn age_rule_accepts_inclusive_bounds_only() {
        let rule = AgeRule::default();
        for accepted in ["18", "100", "18.0", " 42 ", "1e2"] {
            assert!(rule.accepts(accepted), "{accepted:?} should be accepted");
        }
        for rejected in ["17", "101", "17.99", "", "abc", "18-24"] {
            assert!(!rule.accepts(rejected), "{rejected:?} should be rejected");
        }
    }

    #[test]
    fn disabled_age_rule_ignores_age_field() -> Result<()> {
        let mut dom = parse_html(THREE_PAGES)?;
        let mut controller = PagedFormController::initialize(
            &mut dom,
            FormConfig::default().with_age_rule(None),
        )?;
        controller.advance(&mut dom)?;
        assert_eq!(
            controller.advance(&mut dom)?,
            NavigationOutcome::Moved { from: 1, to: 2 }
        );
        Ok(())
    }

    #[test]
    fn initialize_reports_missing_elements() -> Result<()> {
        let mut dom = parse_html(
            r#"
            <div id="formProgress"></div>
            <section class="question-section"></section>
            <button class="prev-btn"></button>
            <button class="next-btn"></button>
            "#,
        )?;
        assert_eq!(
            PagedFormController::initialize(&mut dom, FormConfig::default()).err(),
            Some(Error::MissingElement {
                role: "submit".into(),
                selector: ".submit-btn".into(),
            })
        );

        let mut empty = parse_html("<div id='formProgress'></div>")?;
        assert_eq!(
            PagedFormController::initialize(&mut empty, FormConfig::default()).err(),
            Some(Error::NoPages(".question-section".into()))
        );
        Ok(())
    }

    #[test]
    fn config_validation_rejects_bad_selectors_and_bounds() {
        let bad_selector = FormConfig::default().with_next_selector("  ");
        assert!(matches!(bad_selector.validate(), Err(Error::InvalidConfig(_))));

        let unsupported = FormConfig::default().with_prev_selector("button:hover");
        assert!(matches!(unsupported.validate(), Err(Error::InvalidConfig(_))));

        let inverted = FormConfig::default().with_age_rule(Some(AgeRule {
            min: 50.0,
            max: 10.0,
            ..AgeRule::default()
        }));
        assert!(matches!(inverted.validate(), Err(Error::InvalidConfig(_))));

        let silent = FormConfig::default().with_age_rule(Some(AgeRule {
            message: String::new(),
            ..AgeRule::default()
        }));
        assert!(matches!(silent.validate(), Err(Error::InvalidConfig(_))));

        assert!(FormConfig::default().validate().is_ok());
    }

    #[test]
    fn role_of_matches_control_and_its_descendants() -> Result<()> {
        let mut dom = parse_html(
            r#"
            <div id="formProgress"></div>
            <section class="question-section"></section>
            <button class="prev-btn"><span id="prev-icon">&lt;</span></button>
            <button class="next-btn">Next</button>
            <button class="submit-btn">Send</button>
            <p id="elsewhere"></p>
            "#,
        )?;
        let controller = PagedFormController::initialize(&mut dom, FormConfig::default())?;
        let icon = dom.by_id("prev-icon").expect("icon exists");
        let elsewhere = dom.by_id("elsewhere").expect("paragraph exists");
        assert_eq!(controller.role_of(&dom, icon), Some(ControlRole::Previous));
        assert_eq!(controller.role_of(&dom, controller.next), Some(ControlRole::Next));
        assert_eq!(controller.role_of(&dom, elsewhere), None);
        Ok(())
    }
}
