use super::*;
use crate::controller::{ControlRole, field_label};
use crate::dom::{
    input_type, is_checkbox_input, is_radio_input, is_submit_control, is_validatable_control,
    truncate_chars,
};
use crate::html::parse_html;
use crate::validity::{
    check_validity, compute_validity, is_effectively_disabled, report_validity,
    validation_message,
};
use std::collections::VecDeque;

/// A form submission that passed interactive validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    pub form_id: Option<String>,
    pub method: String,
    pub action: String,
    pub entries: Vec<(String, String)>,
}

impl FormSubmission {
    /// First value submitted under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }
}

#[derive(Debug)]
struct TraceState {
    enabled: bool,
    events: bool,
    validation: bool,
    navigation: bool,
    forward: bool,
    logs: VecDeque<String>,
    log_limit: usize,
}

impl Default for TraceState {
    fn default() -> Self {
        Self {
            enabled: false,
            events: true,
            validation: true,
            navigation: true,
            forward: true,
            logs: VecDeque::new(),
            log_limit: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TraceCategory {
    Events,
    Validation,
    Navigation,
}

/// Host page for a paged form: owns the document and the controller started on load.
#[derive(Debug)]
pub struct Harness {
    dom: Dom,
    controller: PagedFormController,
    trace: TraceState,
    submissions: Vec<FormSubmission>,
}

impl Harness {
    pub fn from_html(html: &str) -> Result<Self> {
        Self::from_html_with_config(html, FormConfig::default())
    }

    /// Parses `html` and fires `DOMContentLoaded`, which starts the controller.
    pub fn from_html_with_config(html: &str, config: FormConfig) -> Result<Self> {
        let mut dom = parse_html(html)?;
        let controller = PagedFormController::initialize(&mut dom, config)?;
        Ok(Self {
            dom,
            controller,
            trace: TraceState::default(),
            submissions: Vec::new(),
        })
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.trace.enabled = enabled;
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        self.trace.logs.drain(..).collect()
    }

    pub fn set_trace_events(&mut self, enabled: bool) {
        self.trace.events = enabled;
    }

    pub fn set_trace_validation(&mut self, enabled: bool) {
        self.trace.validation = enabled;
    }

    pub fn set_trace_navigation(&mut self, enabled: bool) {
        self.trace.navigation = enabled;
    }

    /// Also emit trace lines as `tracing` debug events.
    pub fn set_trace_forwarding(&mut self, enabled: bool) {
        self.trace.forward = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::InvalidConfig(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.trace.log_limit = max_entries;
        while self.trace.logs.len() > self.trace.log_limit {
            self.trace.logs.pop_front();
        }
        Ok(())
    }

    pub fn current_page(&self) -> usize {
        self.controller.current_page()
    }

    pub fn page_count(&self) -> usize {
        self.controller.page_count()
    }

    pub fn progress_percent(&self) -> f64 {
        self.controller.progress_percent()
    }

    pub fn controls(&self) -> ControlState {
        self.controller.controls()
    }

    pub fn controller(&self) -> &PagedFormController {
        &self.controller
    }

    pub fn take_submissions(&mut self) -> Vec<FormSubmission> {
        std::mem::take(&mut self.submissions)
    }

    pub fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        if is_effectively_disabled(&self.dom, target) || self.dom.readonly(target) {
            return Ok(());
        }

        let tag = self
            .dom
            .tag_name(target)
            .ok_or_else(|| Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "input or textarea".into(),
                actual: "non-element".into(),
            })?
            .to_ascii_lowercase();
        if tag != "input" && tag != "textarea" {
            return Err(Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "input or textarea".into(),
                actual: tag,
            });
        }

        self.dom.set_value(target, text)?;
        self.user_edited(target)?;
        self.trace_event("input", target);
        Ok(())
    }

    pub fn set_checked(&mut self, selector: &str, checked: bool) -> Result<()> {
        let target = self.select_one(selector)?;
        if is_effectively_disabled(&self.dom, target) {
            return Ok(());
        }
        if !is_checkbox_input(&self.dom, target) && !is_radio_input(&self.dom, target) {
            let actual = match input_type(&self.dom, target) {
                Some(kind) => format!("input[type={kind}]"),
                None => self.dom.tag_name(target).unwrap_or_default().to_string(),
            };
            return Err(Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "input[type=checkbox|radio]".into(),
                actual,
            });
        }

        if self.dom.checked(target)? != checked {
            self.toggle_checked(target, checked)?;
        }
        Ok(())
    }

    pub fn select_option(&mut self, selector: &str, value: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        if !self.dom.has_tag(target, "select") {
            return Err(Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "select".into(),
                actual: self.dom.tag_name(target).unwrap_or_default().to_string(),
            });
        }
        if is_effectively_disabled(&self.dom, target) {
            return Ok(());
        }

        self.dom.set_value(target, value)?;
        self.user_edited(target)?;
        self.trace_event("change", target);
        Ok(())
    }

    /// Clicks like a user: toggles checkables, drives the navigation controls and submits forms.
    pub fn click(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let activation = self.dom.closest(target, "button")?.unwrap_or(target);
        if is_effectively_disabled(&self.dom, target)
            || is_effectively_disabled(&self.dom, activation)
        {
            return Ok(());
        }
        self.trace_event("click", target);

        if is_checkbox_input(&self.dom, target) {
            let current = self.dom.checked(target)?;
            self.toggle_checked(target, !current)?;
        }
        if is_radio_input(&self.dom, target) && !self.dom.checked(target)? {
            self.toggle_checked(target, true)?;
        }

        match self.controller.role_of(&self.dom, target) {
            Some(ControlRole::Next) => {
                self.next_page()?;
            }
            Some(ControlRole::Previous) => {
                self.previous_page()?;
            }
            Some(ControlRole::Submit) | None => {}
        }

        let submitter = if is_submit_control(&self.dom, target) {
            Some(target)
        } else {
            self.dom
                .closest(target, "button")?
                .filter(|button| is_submit_control(&self.dom, *button))
        };
        if let Some(form) = submitter.and_then(|node| self.dom.find_ancestor_by_tag(node, "form")) {
            self.submit_form(form)?;
        }
        Ok(())
    }

    /// Submits the form at (or around) `selector` after interactive validation.
    pub fn submit(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let form = if self.dom.has_tag(target, "form") {
            Some(target)
        } else {
            self.dom.find_ancestor_by_tag(target, "form")
        };
        if let Some(form) = form {
            self.submit_form(form)?;
        }
        Ok(())
    }

    pub fn next_page(&mut self) -> Result<NavigationOutcome> {
        let from = self.controller.current_page();
        let outcome = self.controller.advance(&mut self.dom)?;
        self.trace_navigation("advance", from, &outcome);
        Ok(outcome)
    }

    pub fn previous_page(&mut self) -> Result<NavigationOutcome> {
        let from = self.controller.current_page();
        let outcome = self.controller.retreat(&mut self.dom)?;
        self.trace_navigation("retreat", from, &outcome);
        Ok(outcome)
    }

    /// Validates the visible page without moving, reporting each invalid field.
    pub fn validate_current_page(&mut self) -> Result<bool> {
        let page = self.controller.current_page();
        let validation = self.controller.validate_page(&mut self.dom, page)?;
        if !validation.valid {
            self.trace_validation(format!(
                "[validation] page={page} invalid={}",
                validation.invalid.join(",")
            ));
        }
        Ok(validation.valid)
    }

    pub fn is_visible(&self, selector: &str) -> Result<bool> {
        let target = self.select_one(selector)?;
        Ok(self.dom.is_rendered(target))
    }

    pub fn is_disabled(&self, selector: &str) -> Result<bool> {
        let target = self.select_one(selector)?;
        Ok(self.dom.disabled(target))
    }

    pub fn validity(&self, selector: &str) -> Result<ValidityState> {
        let target = self.select_one(selector)?;
        compute_validity(&self.dom, target)
    }

    pub fn check_validity(&self, selector: &str) -> Result<bool> {
        let target = self.select_one(selector)?;
        check_validity(&self.dom, target)
    }

    pub fn validation_message(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        validation_message(&self.dom, target)
    }

    /// Message last surfaced for the field by a page or submit validation, if any.
    pub fn reported_message(&self, selector: &str) -> Result<Option<String>> {
        let target = self.select_one(selector)?;
        self.dom.reported_message(target)
    }

    pub fn assert_text(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.text_content(target);
        self.expect_equal(selector, target, expected, actual)
    }

    pub fn assert_value(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.value(target)?;
        self.expect_equal(selector, target, expected, actual)
    }

    pub fn assert_checked(&self, selector: &str, expected: bool) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.checked(target)?;
        self.expect_equal(selector, target, &expected.to_string(), actual.to_string())
    }

    pub fn assert_visible(&self, selector: &str, expected: bool) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.is_rendered(target);
        self.expect_equal(selector, target, &expected.to_string(), actual.to_string())
    }

    pub fn assert_disabled(&self, selector: &str, expected: bool) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.disabled(target);
        self.expect_equal(selector, target, &expected.to_string(), actual.to_string())
    }

    pub fn assert_style(&self, selector: &str, property: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.style_get(target, property)?;
        self.expect_equal(selector, target, expected, actual)
    }

    pub fn assert_exists(&self, selector: &str) -> Result<()> {
        let _ = self.select_one(selector)?;
        Ok(())
    }

    pub fn dump_dom(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        Ok(self.dom.dump_node(target))
    }

    fn expect_equal(
        &self,
        selector: &str,
        target: NodeId,
        expected: &str,
        actual: String,
    ) -> Result<()> {
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    fn select_one(&self, selector: &str) -> Result<NodeId> {
        self.dom
            .query_selector(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
    }

    fn node_snippet(&self, node_id: NodeId) -> String {
        truncate_chars(&self.dom.dump_node(node_id), 200)
    }

    fn user_edited(&mut self, target: NodeId) -> Result<()> {
        self.dom.mark_dirty(target)?;
        self.dom.set_reported_message(target, None)
    }

    fn toggle_checked(&mut self, target: NodeId, checked: bool) -> Result<()> {
        if checked && is_radio_input(&self.dom, target) {
            self.uncheck_other_radios_in_group(target)?;
        }
        self.dom.set_checked(target, checked)?;
        self.user_edited(target)?;
        self.trace_event("change", target);
        Ok(())
    }

    fn uncheck_other_radios_in_group(&mut self, target: NodeId) -> Result<()> {
        let Some(name) = self.dom.attr(target, "name").filter(|name| !name.is_empty()) else {
            return Ok(());
        };
        let form = self.dom.find_ancestor_by_tag(target, "form");
        let others = self
            .dom
            .all_element_nodes()
            .into_iter()
            .filter(|node| {
                *node != target
                    && is_radio_input(&self.dom, *node)
                    && self.dom.attr(*node, "name").as_deref() == Some(name.as_str())
                    && self.dom.find_ancestor_by_tag(*node, "form") == form
            })
            .collect::<Vec<_>>();
        for other in others {
            self.dom.set_checked(other, false)?;
        }
        Ok(())
    }

    /// Interactive validation then entry collection; the first invalid control blocks it.
    fn submit_form(&mut self, form: NodeId) -> Result<bool> {
        let mut descendants = Vec::new();
        self.dom.collect_elements_descendants_dfs(form, &mut descendants);
        let controls = descendants
            .into_iter()
            .filter(|node| is_validatable_control(&self.dom, *node))
            .collect::<Vec<_>>();

        for control in &controls {
            if !check_validity(&self.dom, *control)? {
                report_validity(&mut self.dom, *control)?;
                let message = self.dom.reported_message(*control)?.unwrap_or_default();
                self.trace_validation(format!(
                    "[submit] blocked field={} message={message}",
                    field_label(&self.dom, *control)
                ));
                return Ok(false);
            }
        }

        let mut entries = Vec::new();
        for control in controls {
            if let Some(entry) = self.submission_entry(control)? {
                entries.push(entry);
            }
        }

        let submission = FormSubmission {
            form_id: self.dom.attr(form, "id"),
            method: self
                .dom
                .attr(form, "method")
                .map(|method| method.to_ascii_lowercase())
                .filter(|method| method == "post" || method == "dialog")
                .unwrap_or_else(|| "get".to_string()),
            action: self.dom.attr(form, "action").unwrap_or_default(),
            entries,
        };
        self.trace_line(
            TraceCategory::Events,
            format!(
                "[submit] form={} entries={}",
                describe_node(&self.dom, form),
                submission.entries.len()
            ),
        );
        self.submissions.push(submission);
        Ok(true)
    }

    fn submission_entry(&self, control: NodeId) -> Result<Option<(String, String)>> {
        let Some(name) = self.dom.attr(control, "name").filter(|name| !name.is_empty()) else {
            return Ok(None);
        };
        if is_effectively_disabled(&self.dom, control) {
            return Ok(None);
        }
        if let Some(kind) = input_type(&self.dom, control) {
            if matches!(kind.as_str(), "submit" | "button" | "reset" | "image" | "file") {
                return Ok(None);
            }
        }
        if is_checkbox_input(&self.dom, control) || is_radio_input(&self.dom, control) {
            if !self.dom.checked(control)? {
                return Ok(None);
            }
            let value = self
                .dom
                .attr(control, "value")
                .unwrap_or_else(|| "on".to_string());
            return Ok(Some((name, value)));
        }
        Ok(Some((name, self.dom.value(control)?)))
    }

    fn trace_event(&mut self, event: &str, target: NodeId) {
        let line = format!("[event] {event} target={}", describe_node(&self.dom, target));
        self.trace_line(TraceCategory::Events, line);
    }

    fn trace_navigation(&mut self, direction: &str, from: usize, outcome: &NavigationOutcome) {
        let line = match outcome {
            NavigationOutcome::Moved { from, to } => format!("[nav] {direction} {from}->{to}"),
            NavigationOutcome::Blocked { invalid } => {
                let line = format!("[validation] page={from} invalid={}", invalid.join(","));
                self.trace_line(TraceCategory::Validation, line);
                format!("[nav] {direction} blocked page={from}")
            }
            NavigationOutcome::AtBoundary => format!("[nav] {direction} at boundary page={from}"),
        };
        self.trace_line(TraceCategory::Navigation, line);
    }

    fn trace_validation(&mut self, line: String) {
        self.trace_line(TraceCategory::Validation, line);
    }

    fn trace_line(&mut self, category: TraceCategory, line: String) {
        if !self.trace.enabled {
            return;
        }
        let category_enabled = match category {
            TraceCategory::Events => self.trace.events,
            TraceCategory::Validation => self.trace.validation,
            TraceCategory::Navigation => self.trace.navigation,
        };
        if !category_enabled {
            return;
        }
        if self.trace.forward {
            tracing::debug!(target: "paged_form::trace", "{line}");
        }
        if self.trace.logs.len() >= self.trace.log_limit {
            self.trace.logs.pop_front();
        }
        self.trace.logs.push_back(line);
    }
}

/// `tag#id.class` label used in trace lines.
fn describe_node(dom: &Dom, node: NodeId) -> String {
    let mut out = dom.tag_name(node).unwrap_or("#node").to_ascii_lowercase();
    if let Some(id) = dom.attr(node, "id").filter(|id| !id.is_empty()) {
        out.push('#');
        out.push_str(&id);
    }
    if let Some(classes) = dom.attr(node, "class") {
        for class in classes.split_whitespace() {
            out.push('.');
            out.push_str(class);
        }
    }
    out
}
