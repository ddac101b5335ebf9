use serde::{Deserialize, Serialize};

/// One input element's attributes, flattened out of the live DOM.
///
/// Recomputed on every scan; never persisted. The classifier only ever sees
/// this shape, so the matching heuristics run identically against a real
/// page adapter or the in-memory [`StaticPage`] used in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputField {
    pub id: u64,
    pub input_type: String,
    pub name: String,
    pub dom_id: String,
    pub class_name: String,
    pub placeholder: String,
    pub aria_label: String,
    pub autocomplete: String,
    pub inputmode: String,
    pub test_id: String,
    pub maxlength: Option<u32>,
    pub disabled: bool,
    pub read_only: bool,
    pub visible: bool,
    pub value: String,
    pub focused: bool,
    /// Inside an open modal/dialog container (role=dialog, aria-modal, ...).
    pub in_dialog: bool,
    /// Visible text of the enclosing form or nearest meaningful container.
    pub container_text: String,
    /// Shared ancestor id, used to group split-digit widgets.
    pub group: Option<u64>,
    /// Id of the enclosing form element, if any.
    pub form: Option<u64>,
    /// Document order among scanned inputs.
    pub dom_order: usize,
}

impl Default for InputField {
    fn default() -> Self {
        InputField {
            id: 0,
            input_type: "text".to_string(),
            name: String::new(),
            dom_id: String::new(),
            class_name: String::new(),
            placeholder: String::new(),
            aria_label: String::new(),
            autocomplete: String::new(),
            inputmode: String::new(),
            test_id: String::new(),
            maxlength: None,
            disabled: false,
            read_only: false,
            visible: true,
            value: String::new(),
            focused: false,
            in_dialog: false,
            container_text: String::new(),
            group: None,
            form: None,
            dom_order: 0,
        }
    }
}

impl InputField {
    /// Lowercased name/id/class haystack for attribute-substring matching.
    pub fn attr_haystack(&self) -> String {
        format!("{} {} {}", self.name, self.dom_id, self.class_name).to_lowercase()
    }

    /// Lowercased aria-label/placeholder haystack.
    pub fn hint_haystack(&self) -> String {
        format!("{} {}", self.aria_label, self.placeholder).to_lowercase()
    }

    /// Visible, enabled, writable, and not already holding a value.
    pub fn fillable(&self) -> bool {
        self.visible && !self.disabled && !self.read_only && self.value.is_empty()
    }
}

/// Events a reactive front-end expects to observe when a field changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyntheticEvent {
    Focus,
    KeyDown,
    KeyPress,
    KeyUp,
    Input,
    Change,
    Blur,
}

/// A DOM subtree changed; the embedder forwards these while a fill attempt
/// is waiting for a late-appearing field.
#[derive(Debug, Clone, Default)]
pub struct MutationEvent {
    pub added_nodes: usize,
}

/// The slice of the page the fill pipeline needs.
///
/// `set_native_value` stands for assignment through the platform value
/// setter, bypassing any property override a framework installed.
pub trait PageDom {
    fn inputs(&self) -> Vec<InputField>;
    /// Returns false when the element no longer exists; callers skip silently.
    fn set_native_value(&mut self, id: u64, value: &str) -> bool;
    fn dispatch(&mut self, id: u64, event: SyntheticEvent);
    /// Invoke a submit-like control near the element, or synthesize Enter on
    /// it and submit its form ancestor. Returns whether anything was invoked.
    fn submit_near(&mut self, id: u64) -> bool;
}

/// Words that mark a button as the form's submit action.
const SUBMIT_WORDS: &[&str] = &[
    "submit", "verify", "confirm", "continue", "next", "done", "sign in", "log in", "validate",
];

pub fn is_submit_like(button_type: &str, text: &str) -> bool {
    if button_type.eq_ignore_ascii_case("submit") {
        return true;
    }
    let lower = text.to_lowercase();
    SUBMIT_WORDS.iter().any(|w| lower.contains(w))
}

/// A button element as seen by [`StaticPage`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ButtonNode {
    pub id: u64,
    pub text: String,
    pub button_type: String,
    pub in_dialog: bool,
    pub form: Option<u64>,
}

/// In-memory page used by tests and the demo binary.
///
/// Records every synthetic event, click, and form submission so assertions
/// can check the exact sequence a real page would observe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticPage {
    pub fields: Vec<InputField>,
    pub buttons: Vec<ButtonNode>,
    #[serde(skip)]
    events: Vec<(u64, SyntheticEvent)>,
    #[serde(skip)]
    clicked_buttons: Vec<u64>,
    #[serde(skip)]
    submitted_forms: Vec<u64>,
}

impl StaticPage {
    pub fn new(fields: Vec<InputField>) -> Self {
        StaticPage {
            fields,
            ..StaticPage::default()
        }
    }

    pub fn with_buttons(fields: Vec<InputField>, buttons: Vec<ButtonNode>) -> Self {
        StaticPage {
            fields,
            buttons,
            ..StaticPage::default()
        }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn field(&self, id: u64) -> Option<&InputField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn push_field(&mut self, field: InputField) {
        self.fields.push(field);
    }

    pub fn events(&self) -> &[(u64, SyntheticEvent)] {
        &self.events
    }

    pub fn events_for(&self, id: u64) -> Vec<SyntheticEvent> {
        self.events
            .iter()
            .filter(|(eid, _)| *eid == id)
            .map(|(_, e)| *e)
            .collect()
    }

    pub fn clicked_buttons(&self) -> &[u64] {
        &self.clicked_buttons
    }

    pub fn submitted_forms(&self) -> &[u64] {
        &self.submitted_forms
    }
}

impl PageDom for StaticPage {
    fn inputs(&self) -> Vec<InputField> {
        let mut inputs = self.fields.clone();
        inputs.sort_by_key(|f| f.dom_order);
        inputs
    }

    fn set_native_value(&mut self, id: u64, value: &str) -> bool {
        match self.fields.iter_mut().find(|f| f.id == id) {
            Some(field) => {
                field.value = value.to_string();
                true
            }
            None => false,
        }
    }

    fn dispatch(&mut self, id: u64, event: SyntheticEvent) {
        self.events.push((id, event));
    }

    fn submit_near(&mut self, id: u64) -> bool {
        let Some(field) = self.field(id).cloned() else {
            return false;
        };

        // Prefer a submit-like button in the same dialog or form.
        let button = self
            .buttons
            .iter()
            .find(|b| {
                is_submit_like(&b.button_type, &b.text)
                    && ((field.in_dialog && b.in_dialog)
                        || (field.form.is_some() && b.form == field.form))
            })
            .map(|b| b.id);
        if let Some(button_id) = button {
            self.clicked_buttons.push(button_id);
            return true;
        }

        // No button: synthesize Enter on the field, then submit its form.
        self.dispatch(id, SyntheticEvent::KeyDown);
        self.dispatch(id, SyntheticEvent::KeyPress);
        self.dispatch(id, SyntheticEvent::KeyUp);
        if let Some(form) = field.form {
            self.submitted_forms.push(form);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_field(id: u64) -> InputField {
        InputField {
            id,
            dom_order: id as usize,
            ..InputField::default()
        }
    }

    #[test]
    fn test_set_native_value_records_value() {
        let mut page = StaticPage::new(vec![text_field(1)]);
        assert!(page.set_native_value(1, "847293"));
        assert_eq!(page.field(1).unwrap().value, "847293");
        // Missing element is not an error.
        assert!(!page.set_native_value(99, "847293"));
    }

    #[test]
    fn test_submit_prefers_button_in_form() {
        let mut field = text_field(1);
        field.form = Some(10);
        let button = ButtonNode {
            id: 2,
            text: "Verify".to_string(),
            form: Some(10),
            ..ButtonNode::default()
        };
        let mut page = StaticPage::with_buttons(vec![field], vec![button]);
        assert!(page.submit_near(1));
        assert_eq!(page.clicked_buttons(), &[2]);
        assert!(page.submitted_forms().is_empty());
    }

    #[test]
    fn test_submit_falls_back_to_enter_and_form() {
        let mut field = text_field(1);
        field.form = Some(10);
        let mut page = StaticPage::new(vec![field]);
        assert!(page.submit_near(1));
        assert_eq!(
            page.events_for(1),
            vec![
                SyntheticEvent::KeyDown,
                SyntheticEvent::KeyPress,
                SyntheticEvent::KeyUp
            ]
        );
        assert_eq!(page.submitted_forms(), &[10]);
    }

    #[test]
    fn test_submit_without_button_or_form() {
        let mut page = StaticPage::new(vec![text_field(1)]);
        assert!(!page.submit_near(1));
    }

    #[test]
    fn test_is_submit_like() {
        assert!(is_submit_like("submit", ""));
        assert!(is_submit_like("button", "Continue"));
        assert!(is_submit_like("", "Verify code"));
        assert!(!is_submit_like("button", "Cancel"));
    }

    #[test]
    fn test_snapshot_deserializes_with_defaults() {
        let json = r#"{
            "fields": [
                { "id": 1, "name": "otp", "maxlength": 6 },
                { "id": 2, "input_type": "password", "name": "pw" }
            ],
            "buttons": [ { "id": 3, "text": "Verify" } ]
        }"#;
        let page = StaticPage::from_json(json).unwrap();
        assert_eq!(page.fields.len(), 2);
        assert!(page.field(1).unwrap().visible);
        assert_eq!(page.field(2).unwrap().input_type, "password");
    }
}
