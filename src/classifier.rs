use crate::dom::InputField;
use crate::extractor::CONTEXT_KEYWORDS;
use crate::heuristics::Heuristics;
use std::collections::BTreeMap;

/// Attribute substrings that positively identify an OTP entry field.
const OTP_ATTR_KEYWORDS: &[&str] = &[
    "otp", "one-time", "onetime", "one_time", "2fa", "mfa", "totp", "verification", "verif",
    "code", "token", "pin",
];

/// Attribute substrings that identify fields which must never receive a code.
const EXCLUSION_KEYWORDS: &[&str] = &[
    "password", "passwd", "email", "e-mail", "search", "username", "user-name", "user_name",
    "address", "street", "city", "postal", "zipcode", "zip-code", "phone", "telephone", "mobile",
    "card-number", "cardnumber", "cvv", "cvc", "expir", "birth", "ssn",
];

/// Input types that are never OTP fields.
const EXCLUDED_TYPES: &[&str] = &[
    "password", "email", "search", "url", "file", "hidden", "checkbox", "radio", "range",
    "color", "date", "datetime-local", "month", "week", "time", "submit", "button",
];

/// Input types an OTP field can legitimately carry.
const FILLABLE_TYPES: &[&str] = &["text", "tel", "number", ""];

// Fallback score weights, kept next to the tables they pair with.
const SCORE_BOUNDED_MAXLENGTH: i32 = 2;
const SCORE_PREFERRED_MAXLENGTH: i32 = 1;
const SCORE_NUMERIC: i32 = 2;
const SCORE_OTP_ATTR: i32 = 3;
const SCORE_CONTEXT_TEXT: i32 = 2;
const SCORE_HINT: i32 = 1;
const PENALTY_EXCLUSION_CONTEXT: i32 = 4;

/// Where a detected code should be typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillTarget {
    /// One input receives the whole code.
    Single(u64),
    /// A split-digit widget; one character per element, in order.
    Multiple(Vec<u64>),
}

/// Scores page inputs and picks the field(s) most likely to expect a
/// verification code. Stateless per scan; tiers are tried in order and
/// the first hit wins.
pub struct FieldClassifier {
    heuristics: Heuristics,
}

impl FieldClassifier {
    pub fn new(heuristics: &Heuristics) -> Self {
        FieldClassifier {
            heuristics: heuristics.clone(),
        }
    }

    /// Select the best fill target for `code` among `inputs`.
    pub fn select(&self, inputs: &[InputField], code: &str) -> Option<FillTarget> {
        let mut eligible: Vec<&InputField> = inputs.iter().filter(|f| f.fillable()).collect();
        eligible.sort_by_key(|f| f.dom_order);

        // Verification prompts are frequently rendered as overlays; an open
        // dialog gets first claim on the code.
        let dialog: Vec<&InputField> = eligible
            .iter()
            .copied()
            .filter(|f| f.in_dialog)
            .collect();
        if !dialog.is_empty() {
            if let Some(target) = self.select_scoped(&dialog, code) {
                return Some(target);
            }
        }

        if let Some(target) = self.select_scoped(&eligible, code) {
            return Some(target);
        }

        if let Some(target) = self.select_focused(&eligible) {
            return Some(target);
        }

        self.select_scored(&eligible)
    }

    /// Attribute tiers, split-digit groups, and container context, in order.
    fn select_scoped(&self, fields: &[&InputField], code: &str) -> Option<FillTarget> {
        if let Some(id) = self.select_by_attributes(fields) {
            return Some(FillTarget::Single(id));
        }
        if let Some(ids) = self.select_split_group(fields, code) {
            return Some(FillTarget::Multiple(ids));
        }
        if let Some(id) = self.select_by_container_text(fields) {
            return Some(FillTarget::Single(id));
        }
        None
    }

    /// Curated attribute-selector tiers; earlier tiers are stronger evidence.
    fn select_by_attributes(&self, fields: &[&InputField]) -> Option<u64> {
        // autocomplete="one-time-code" is the platform's own annotation.
        if let Some(f) = fields
            .iter()
            .find(|f| f.autocomplete.eq_ignore_ascii_case("one-time-code") && self.allowed(f))
        {
            return Some(f.id);
        }

        // name/id/class substrings.
        if let Some(f) = fields.iter().find(|f| {
            let haystack = f.attr_haystack();
            OTP_ATTR_KEYWORDS.iter().any(|k| haystack.contains(k)) && self.allowed(f)
        }) {
            return Some(f.id);
        }

        // Short bounded tel/text/number inputs.
        if let Some(f) = fields.iter().find(|f| {
            FILLABLE_TYPES.contains(&f.input_type.as_str())
                && self.bounded_maxlength(f)
                && f.maxlength != Some(1)
                && self.allowed(f)
        }) {
            return Some(f.id);
        }

        // aria-label / placeholder hints.
        if let Some(f) = fields.iter().find(|f| {
            let hints = f.hint_haystack();
            OTP_ATTR_KEYWORDS.iter().any(|k| hints.contains(k)) && self.allowed(f)
        }) {
            return Some(f.id);
        }

        // Framework test ids as a last attribute resort.
        if let Some(f) = fields.iter().find(|f| {
            let tid = f.test_id.to_lowercase();
            OTP_ATTR_KEYWORDS.iter().any(|k| tid.contains(k)) && self.allowed(f)
        }) {
            return Some(f.id);
        }

        None
    }

    /// A group of 4-8 single-character inputs sharing an ancestor is a
    /// split-digit OTP widget. Single-char inputs outside the chosen group
    /// are never part of the target.
    fn select_split_group(&self, fields: &[&InputField], code: &str) -> Option<Vec<u64>> {
        let mut groups: BTreeMap<u64, Vec<&InputField>> = BTreeMap::new();
        for f in fields {
            if f.maxlength == Some(1) && self.allowed(f) {
                if let Some(group) = f.group {
                    groups.entry(group).or_default().push(f);
                }
            }
        }

        let mut best: Option<Vec<u64>> = None;
        let mut best_order = usize::MAX;
        for members in groups.values() {
            if members.len() < self.heuristics.group_min
                || members.len() > self.heuristics.group_max
            {
                continue;
            }
            // A group sized exactly to the code is the strongest match, but
            // any group in bounds can take it.
            let mut ordered: Vec<&InputField> = members.clone();
            ordered.sort_by_key(|f| f.dom_order);
            let first_order = ordered[0].dom_order;
            let exact = members.len() == code.chars().count();
            if exact {
                return Some(ordered.iter().map(|f| f.id).collect());
            }
            if first_order < best_order {
                best_order = first_order;
                best = Some(ordered.iter().map(|f| f.id).collect());
            }
        }
        best
    }

    /// Any plain empty input whose surrounding text talks about verification,
    /// with length/inputmode corroboration.
    fn select_by_container_text(&self, fields: &[&InputField]) -> Option<u64> {
        fields
            .iter()
            .find(|f| {
                FILLABLE_TYPES.contains(&f.input_type.as_str())
                    && self.allowed(f)
                    && has_context_keyword(&f.container_text)
                    && (self.bounded_maxlength(f) || self.numeric_leaning(f))
            })
            .map(|f| f.id)
    }

    /// The input the user is already in, if it plausibly takes a code.
    fn select_focused(&self, fields: &[&InputField]) -> Option<FillTarget> {
        fields
            .iter()
            .find(|f| {
                f.focused
                    && FILLABLE_TYPES.contains(&f.input_type.as_str())
                    && self.allowed(f)
                    && (f.maxlength.is_none() || self.bounded_maxlength(f))
            })
            .map(|f| FillTarget::Single(f.id))
    }

    /// Last resort: additive scoring over every remaining field; the winner
    /// still needs a positive score.
    fn select_scored(&self, fields: &[&InputField]) -> Option<FillTarget> {
        let mut best: Option<(i32, u64)> = None;
        for f in fields {
            if !self.allowed(f) || !FILLABLE_TYPES.contains(&f.input_type.as_str()) {
                continue;
            }
            let score = self.score(f);
            log::trace!("field {} scored {score}", f.id);
            match best {
                Some((top, _)) if top >= score => {}
                _ => best = Some((score, f.id)),
            }
        }
        match best {
            Some((score, id)) if score > 0 => Some(FillTarget::Single(id)),
            _ => None,
        }
    }

    fn score(&self, f: &InputField) -> i32 {
        let mut score = 0;
        if self.bounded_maxlength(f) {
            score += SCORE_BOUNDED_MAXLENGTH;
            if f.maxlength == Some(self.heuristics.preferred_code_len as u32) {
                score += SCORE_PREFERRED_MAXLENGTH;
            }
        }
        if self.numeric_leaning(f) {
            score += SCORE_NUMERIC;
        }
        let attrs = f.attr_haystack();
        if OTP_ATTR_KEYWORDS.iter().any(|k| attrs.contains(k)) {
            score += SCORE_OTP_ATTR;
        }
        if OTP_ATTR_KEYWORDS
            .iter()
            .any(|k| f.hint_haystack().contains(k))
        {
            score += SCORE_HINT;
        }
        let container = f.container_text.to_lowercase();
        if has_context_keyword(&f.container_text) {
            score += SCORE_CONTEXT_TEXT;
        }
        if EXCLUSION_KEYWORDS.iter().any(|k| container.contains(k)) {
            score -= PENALTY_EXCLUSION_CONTEXT;
        }
        score
    }

    /// Exclusion list, overridden by an explicit OTP-indicating attribute.
    fn allowed(&self, f: &InputField) -> bool {
        if self.has_otp_marker(f) {
            return true;
        }
        if EXCLUDED_TYPES.contains(&f.input_type.to_lowercase().as_str()) {
            return false;
        }
        let haystack = format!("{} {}", f.attr_haystack(), f.hint_haystack());
        !EXCLUSION_KEYWORDS.iter().any(|k| haystack.contains(k))
    }

    fn has_otp_marker(&self, f: &InputField) -> bool {
        if f.autocomplete.eq_ignore_ascii_case("one-time-code") {
            return true;
        }
        let haystack = f.attr_haystack();
        // Only the unambiguous markers override an exclusion; "code" alone
        // does not rescue a password field.
        ["otp", "one-time", "onetime", "2fa", "mfa", "totp"]
            .iter()
            .any(|k| haystack.contains(k))
    }

    fn bounded_maxlength(&self, f: &InputField) -> bool {
        match f.maxlength {
            Some(len) => {
                (len as usize) >= self.heuristics.min_code_len
                    && (len as usize) <= self.heuristics.max_code_len
            }
            None => false,
        }
    }

    fn numeric_leaning(&self, f: &InputField) -> bool {
        f.inputmode.eq_ignore_ascii_case("numeric")
            || f.input_type.eq_ignore_ascii_case("tel")
            || f.input_type.eq_ignore_ascii_case("number")
    }
}

fn has_context_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    CONTEXT_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> FieldClassifier {
        FieldClassifier::new(&Heuristics::default())
    }

    fn field(id: u64) -> InputField {
        InputField {
            id,
            dom_order: id as usize,
            ..InputField::default()
        }
    }

    #[test]
    fn test_one_time_code_autocomplete_beats_password() {
        let mut otp = field(2);
        otp.autocomplete = "one-time-code".to_string();
        let mut password = field(1);
        password.input_type = "password".to_string();
        // Make the password field superficially attractive.
        password.maxlength = Some(6);
        password.inputmode = "numeric".to_string();

        let c = classifier();
        assert_eq!(
            c.select(&[password.clone(), otp], "847293"),
            Some(FillTarget::Single(2))
        );
        // With only the password field present, nothing is selected.
        assert_eq!(c.select(&[password], "847293"), None);
    }

    #[test]
    fn test_name_substring_match() {
        let mut f = field(1);
        f.name = "verification_code".to_string();
        assert_eq!(
            classifier().select(&[f], "847293"),
            Some(FillTarget::Single(1))
        );
    }

    #[test]
    fn test_otp_marker_overrides_exclusion() {
        // A tel-looking name would normally be excluded, but an explicit otp
        // marker wins.
        let mut f = field(1);
        f.name = "phone_otp".to_string();
        assert_eq!(
            classifier().select(&[f], "847293"),
            Some(FillTarget::Single(1))
        );
    }

    #[test]
    fn test_excluded_fields_are_ignored() {
        let mut email = field(1);
        email.input_type = "email".to_string();
        email.maxlength = Some(6);
        let mut username = field(2);
        username.name = "username".to_string();
        username.maxlength = Some(6);
        assert_eq!(classifier().select(&[email, username], "847293"), None);
    }

    #[test]
    fn test_dialog_fields_take_priority() {
        let mut page_field = field(1);
        page_field.name = "code".to_string();
        let mut dialog_field = field(2);
        dialog_field.name = "code".to_string();
        dialog_field.in_dialog = true;
        assert_eq!(
            classifier().select(&[page_field, dialog_field], "847293"),
            Some(FillTarget::Single(2))
        );
    }

    #[test]
    fn test_split_group_selected_without_outsider() {
        let mut fields = Vec::new();
        for i in 0..4u64 {
            let mut f = field(10 + i);
            f.maxlength = Some(1);
            f.group = Some(100);
            fields.push(f);
        }
        // A 5th unrelated single-char input under a different ancestor.
        let mut outsider = field(50);
        outsider.maxlength = Some(1);
        outsider.group = Some(200);
        fields.push(outsider);

        // Only 4 share the ancestor, so the outsider's singleton group is
        // below group_min and the 4-wide widget wins.
        assert_eq!(
            classifier().select(&fields, "4821"),
            Some(FillTarget::Multiple(vec![10, 11, 12, 13]))
        );
    }

    #[test]
    fn test_split_group_ordered_by_dom_order() {
        let mut fields = Vec::new();
        for (order, id) in [(3usize, 13u64), (1, 11), (0, 10), (2, 12)] {
            let mut f = field(id);
            f.dom_order = order;
            f.maxlength = Some(1);
            f.group = Some(100);
            fields.push(f);
        }
        assert_eq!(
            classifier().select(&fields, "4821"),
            Some(FillTarget::Multiple(vec![10, 11, 12, 13]))
        );
    }

    #[test]
    fn test_container_text_tier() {
        let mut f = field(1);
        f.container_text = "Enter the code we sent to your device".to_string();
        f.inputmode = "numeric".to_string();
        assert_eq!(
            classifier().select(&[f], "847293"),
            Some(FillTarget::Single(1))
        );
    }

    #[test]
    fn test_container_text_needs_corroboration() {
        // Context text alone, with no length or inputmode signal and nothing
        // else to score on, is not enough.
        let mut f = field(1);
        f.container_text = "verification code".to_string();
        // Scored fallback still reaches it: context text alone scores +2.
        assert_eq!(
            classifier().select(&[f], "847293"),
            Some(FillTarget::Single(1))
        );

        let mut neutral = field(2);
        neutral.container_text = "Shipping address".to_string();
        assert_eq!(classifier().select(&[neutral], "847293"), None);
    }

    #[test]
    fn test_focused_input_tier() {
        let mut f = field(1);
        f.focused = true;
        assert_eq!(
            classifier().select(&[f], "847293"),
            Some(FillTarget::Single(1))
        );
    }

    #[test]
    fn test_scored_fallback_picks_best() {
        // Neither field carries an attribute or maxlength the earlier tiers
        // would catch; only the numeric inputmode scores.
        let weak = field(1);
        let mut strong = field(2);
        strong.inputmode = "numeric".to_string();
        assert_eq!(
            classifier().select(&[weak.clone(), strong], "847293"),
            Some(FillTarget::Single(2))
        );
        // A zero score is not a match.
        assert_eq!(classifier().select(&[weak], "847293"), None);
    }

    #[test]
    fn test_valued_fields_never_selected() {
        let mut f = field(1);
        f.name = "otp".to_string();
        f.value = "000000".to_string();
        assert_eq!(classifier().select(&[f], "847293"), None);
    }

    #[test]
    fn test_invisible_and_disabled_ignored() {
        let mut hidden = field(1);
        hidden.name = "otp".to_string();
        hidden.visible = false;
        let mut disabled = field(2);
        disabled.name = "otp".to_string();
        disabled.disabled = true;
        let mut readonly = field(3);
        readonly.name = "otp".to_string();
        readonly.read_only = true;
        assert_eq!(
            classifier().select(&[hidden, disabled, readonly], "847293"),
            None
        );
    }
}
