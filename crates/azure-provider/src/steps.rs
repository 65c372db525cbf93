// SPDX-License-Identifier: MIT OR Apache-2.0
//! Codec for the `Microsoft.VSTS.TCM.Steps` embedded-HTML step format.
//!
//! Azure DevOps stores test steps inside the work item as an XML-ish HTML
//! fragment:
//!
//! ```text
//! <steps id="0">
//!   <step id="1" type="ActionStep">
//!     <parameterizedString>action</parameterizedString>
//!     <parameterizedString>expected result</parameterizedString>
//!   </step>
//! </steps>
//! ```
//!
//! Outbound, special characters in step text are entity-escaped. Inbound,
//! parsing is tolerant: a malformed fragment yields an empty step list
//! rather than an error.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use skb_core::TestStep;

/// Render canonical steps as the vendor's embedded HTML.
#[must_use]
pub fn to_steps_html(steps: &[TestStep]) -> String {
    let mut out = String::from(r#"<steps id="0">"#);
    for (idx, step) in steps.iter().enumerate() {
        out.push_str(&format!(r#"<step id="{}" type="ActionStep">"#, idx + 1));
        out.push_str("<parameterizedString>");
        out.push_str(&escape(step.action.as_str()));
        out.push_str("</parameterizedString>");
        out.push_str("<parameterizedString>");
        out.push_str(&escape(step.expected_result.as_str()));
        out.push_str("</parameterizedString>");
        out.push_str("</step>");
    }
    out.push_str("</steps>");
    out
}

/// Parse the vendor's embedded HTML back into ordered canonical steps.
///
/// Sequences are assigned from document order, 1-based. Any XML error
/// yields an empty list.
#[must_use]
pub fn from_steps_html(html: &str) -> Vec<TestStep> {
    let mut reader = Reader::from_str(html);
    let mut steps: Vec<TestStep> = Vec::new();
    let mut texts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_param = false;
    let mut in_step = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"step" => {
                    in_step = true;
                    texts.clear();
                }
                b"parameterizedString" if in_step => {
                    in_param = true;
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_param => match t.unescape() {
                Ok(text) => current.push_str(&text),
                Err(_) => return Vec::new(),
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"parameterizedString" if in_param => {
                    in_param = false;
                    texts.push(current.clone());
                }
                b"step" if in_step => {
                    in_step = false;
                    let action = texts.first().cloned().unwrap_or_default();
                    let expected = texts.get(1).cloned().unwrap_or_default();
                    steps.push(TestStep::new(steps.len() as u32 + 1, action, expected));
                    texts.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"step" && !in_param => {
                // A self-closed step carries no text at all.
                steps.push(TestStep::new(steps.len() as u32 + 1, "", ""));
            }
            Ok(Event::Eof) => break,
            Err(_) => return Vec::new(),
            Ok(_) => {}
        }
    }
    steps
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_the_exact_vendor_shape() {
        let steps = vec![TestStep::new(1, "<b>a</b>", "r")];
        assert_eq!(
            to_steps_html(&steps),
            r#"<steps id="0"><step id="1" type="ActionStep"><parameterizedString>&lt;b&gt;a&lt;/b&gt;</parameterizedString><parameterizedString>r</parameterizedString></step></steps>"#
        );
    }

    #[test]
    fn emitted_html_parses_back_to_the_same_steps() {
        let steps = vec![TestStep::new(1, "<b>a</b>", "r")];
        let parsed = from_steps_html(&to_steps_html(&steps));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].sequence, 1);
        assert_eq!(parsed[0].action, "<b>a</b>");
        assert_eq!(parsed[0].expected_result, "r");
    }

    #[test]
    fn multi_step_round_trip_preserves_order() {
        let steps = vec![
            TestStep::new(1, "open & login", "dashboard > visible"),
            TestStep::new(2, "click \"save\"", "saved"),
            TestStep::new(3, "log out", "login page"),
        ];
        let parsed = from_steps_html(&to_steps_html(&steps));
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].action, "open & login");
        assert_eq!(parsed[0].expected_result, "dashboard > visible");
        assert_eq!(parsed[1].action, "click \"save\"");
        assert_eq!(
            parsed.iter().map(|s| s.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn malformed_html_yields_empty_list() {
        for bad in [
            "<steps><step><parameterizedString>unclosed",
            "<steps id=>bad attr</steps>",
            "<<<not xml at all",
        ] {
            assert!(from_steps_html(bad).is_empty(), "input {bad:?}");
        }
    }

    #[test]
    fn empty_and_steps_less_fragments_yield_empty_list() {
        assert!(from_steps_html("").is_empty());
        assert!(from_steps_html(r#"<steps id="0"></steps>"#).is_empty());
        assert!(from_steps_html("<div>no steps here</div>").is_empty());
    }

    #[test]
    fn step_with_one_parameterized_string_gets_empty_expected() {
        let html = r#"<steps id="0"><step id="1" type="ActionStep"><parameterizedString>only action</parameterizedString></step></steps>"#;
        let parsed = from_steps_html(html);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].action, "only action");
        assert_eq!(parsed[0].expected_result, "");
    }

    #[test]
    fn surrounding_markup_is_ignored() {
        let html = r#"<steps id="0" last="2"><step id="2" type="ActionStep"><parameterizedString isformatted="true">a</parameterizedString><parameterizedString isformatted="true">r</parameterizedString><description/></step></steps>"#;
        let parsed = from_steps_html(html);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].action, "a");
        assert_eq!(parsed[0].expected_result, "r");
        // Sequence comes from document order, not the vendor's step ids.
        assert_eq!(parsed[0].sequence, 1);
    }
}
