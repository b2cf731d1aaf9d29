//! Deterministic paged-form runtime.
//!
//! A form is split into "question sections" that are shown one at a time.
//! [`Harness`] parses the host markup into an in-memory document, fires
//! `DOMContentLoaded` (which starts the [`PagedFormController`]) and then
//! drives the form the way a user would: typing, checking boxes, clicking the
//! navigation controls and submitting.
//!
//! ```
//! use paged_form::Harness;
//!
//! # fn main() -> paged_form::Result<()> {
//! let html = r#"
//! <form id="survey">
//!   <div id="formProgress"></div>
//!   <section class="question-section"><input name="nickname"></section>
//!   <section class="question-section"><input name="age" type="number"></section>
//!   <button type="button" class="prev-btn">Back</button>
//!   <button type="button" class="next-btn">Next</button>
//!   <button type="submit" class="submit-btn">Send</button>
//! </form>
//! "#;
//!
//! let mut h = Harness::from_html(html)?;
//! h.click(".next-btn")?;
//! assert_eq!(h.current_page(), 1);
//! h.assert_style("#formProgress", "width", "100%")?;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};

mod controller;
mod dom;
mod harness;
mod html;
mod pattern;
mod selector;
mod validity;

pub use controller::{AgeRule, ControlState, FormConfig, NavigationOutcome, PagedFormController};
pub use harness::{FormSubmission, Harness};
pub use validity::ValidityState;

use dom::{Dom, NodeId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("html parse error: {0}")]
    HtmlParse(String),
    #[error("selector not found: {0}")]
    SelectorNotFound(String),
    #[error("unsupported selector: {0}")]
    UnsupportedSelector(String),
    /// A control the paged form needs is absent from the document.
    #[error("missing {role} element: {selector}")]
    MissingElement { role: String, selector: String },
    #[error("no form pages match {0}")]
    NoPages(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("dom error: {0}")]
    Dom(String),
    #[error("type mismatch for {selector}: expected {expected}, actual {actual}")]
    TypeMismatch {
        selector: String,
        expected: String,
        actual: String,
    },
    #[error(
        "assertion failed for {selector}: expected {expected}, actual {actual}, snippet {dom_snippet}"
    )]
    AssertionFailed {
        selector: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
}
