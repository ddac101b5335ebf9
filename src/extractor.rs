use crate::heuristics::Heuristics;
use crate::provider::CodeSource;
use lazy_static::lazy_static;
use regex::Regex;

/// Phrases in the body that mark a passage as verification-related.
pub const CONTEXT_KEYWORDS: &[&str] = &[
    "verification code",
    "verify",
    "confirm",
    "authentication",
    "one-time",
    "otp",
    "passcode",
    "security code",
    "sign-in code",
    "login code",
    "access code",
    "confirmation code",
    "two-factor",
    "2fa",
    "mfa",
    "multi-factor",
    "temporary code",
    "enter this code",
    "enter the code",
    "use this code",
    "your code is",
    "code is:",
    "pin code",
    "secret code",
];

/// Subject-line keywords that mark the whole email as a verification email.
pub const SUBJECT_KEYWORDS: &[&str] = &[
    "verification",
    "verify",
    "confirm",
    "sign in",
    "login",
    "security",
    "authentication",
    "one-time",
    "otp",
    "code",
    "access",
];

/// Words that look like codes when uppercased but never are.
const DICTIONARY_WORDS: &[&str] = &[
    "code", "here", "this", "your", "link", "login", "email", "account", "please", "thanks",
    "hello", "today", "update", "secure", "verify", "expires", "minutes", "support", "online",
    "welcome", "password",
];

/// Words that mark a nearby number as a money figure, not a code.
const CURRENCY_WORDS: &[&str] = &[
    "$", "€", "£", "¥", "usd", "eur", "gbp", "dollar", "euro", "price", "total", "amount",
    "balance", "paid", "payment", "charge", "fee", "cost", "refund",
];

/// Phrase templates anchored to the code they introduce. `CODE` is replaced
/// with the configured token pattern at compile time. Order matters: earlier
/// templates bind the code to the least ambiguous phrasing.
const POSITIONAL_TEMPLATES: &[&str] = &[
    r"(?i)verification code\s*(?:is)?\s*[:\-]?\s*\b(CODE)\b",
    r"(?i)your (?:verification|security|one-time|sign-?in|login|access|confirmation) code is\s*[:\-]?\s*\b(CODE)\b",
    r"(?i)(?:enter|use) (?:this|the) code\s*[:\-]?\s*\b(CODE)\b",
    r"(?i)your code is\s*[:\-]?\s*\b(CODE)\b",
    r"(?i)\b(?:otp|passcode|pin)\s*(?:is)?\s*[:\-]?\s*\b(CODE)\b",
    r"(?i)\b(CODE)\b is your (?:verification|security|one-?time|login|sign-?in) code",
    r"(?i)\bsecurity code\s*[:\-]?\s*\b(CODE)\b",
    r"(?i)\bcode\s*:\s*\b(CODE)\b",
];

lazy_static! {
    /// Reference-number prefixes (order/invoice/tracking/ticket), anchored to
    /// the end of the text immediately preceding a candidate token.
    static ref REFERENCE_PREFIX: Regex = Regex::new(
        r"(?i)(?:order|invoice|tracking|ticket|reference|ref|case|confirmation|receipt|account|item|model|serial)\s*(?:number|no\.?|num|id)?\s*[:#]?\s*$"
    )
    .unwrap();
}

/// Extracts verification codes from email text.
///
/// Pure classification: the same `(content, subject)` always yields the same
/// answer. Duplicate suppression belongs to the caller (see [`ScanSession`]
/// and the store's dedup window).
pub struct CodeExtractor {
    heuristics: Heuristics,
    positional_patterns: Vec<Regex>,
    context_pattern: Regex,
    digit_pattern: Regex,
    alnum_pattern: Regex,
}

impl CodeExtractor {
    pub fn new(heuristics: &Heuristics) -> anyhow::Result<Self> {
        heuristics.validate()?;
        let token = format!(
            "[A-Z0-9]{{{},{}}}",
            heuristics.min_code_len, heuristics.max_code_len
        );

        let mut positional_patterns = Vec::with_capacity(POSITIONAL_TEMPLATES.len());
        for template in POSITIONAL_TEMPLATES {
            positional_patterns.push(Regex::new(&template.replace("CODE", &token))?);
        }

        // One case-insensitive alternation so keyword offsets come from the
        // original text. Lowercasing first shifts byte positions for chars
        // whose lowercase form has a different length.
        let context_pattern = Regex::new(&format!(
            "(?i){}",
            CONTEXT_KEYWORDS
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|")
        ))?;

        let digit_pattern = Regex::new(&format!(
            r"\b(\d{{{},{}}})\b",
            heuristics.min_code_len, heuristics.max_code_len
        ))?;
        // Alphanumeric codes must be at least 6 chars to stand out from words.
        let alnum_pattern = Regex::new(&format!(
            r"\b([A-Z0-9]{{6,{}}})\b",
            heuristics.max_code_len.max(6)
        ))?;

        Ok(CodeExtractor {
            heuristics: heuristics.clone(),
            positional_patterns,
            context_pattern,
            digit_pattern,
            alnum_pattern,
        })
    }

    /// Does the body text talk about verification at all?
    pub fn has_verification_context(&self, text: &str) -> bool {
        self.context_pattern.is_match(text)
    }

    /// Does the subject look like a verification email?
    pub fn is_verification_subject(&self, subject: &str) -> bool {
        let lower = subject.to_lowercase();
        SUBJECT_KEYWORDS.iter().any(|k| lower.contains(k))
    }

    /// Extract the most plausible verification code, if any.
    pub fn extract(&self, content: &str, subject: &str) -> Option<String> {
        if !self.has_verification_context(content) && !self.is_verification_subject(subject) {
            return None;
        }

        if let Some(code) = self.extract_positional(content) {
            log::debug!("positional pattern matched code {code}");
            return Some(code);
        }
        if let Some(code) = self.extract_near_keywords(content) {
            log::debug!("proximity search matched code {code}");
            return Some(code);
        }
        if let Some(code) = self.extract_global(content) {
            log::debug!("global fallback matched code {code}");
            return Some(code);
        }
        None
    }

    /// Priority 1: phrase-anchored patterns, in table order.
    fn extract_positional(&self, content: &str) -> Option<String> {
        for pattern in &self.positional_patterns {
            for caps in pattern.captures_iter(content) {
                if let Some(m) = caps.get(1) {
                    if self.accept(content, m.start(), m.end()) {
                        return Some(m.as_str().to_string());
                    }
                }
            }
        }
        None
    }

    /// Priority 2: tokens within a bounded window around each context keyword.
    fn extract_near_keywords(&self, content: &str) -> Option<String> {
        for m in self.context_pattern.find_iter(content) {
            let start = floor_char_boundary(
                content,
                m.start().saturating_sub(self.heuristics.proximity_before),
            );
            let end = floor_char_boundary(
                content,
                (m.end() + self.heuristics.proximity_after).min(content.len()),
            );
            if let Some(code) = self.best_token_in(content, start, end) {
                return Some(code);
            }
        }
        None
    }

    /// Priority 3: whole-text scan, preferred length first.
    fn extract_global(&self, content: &str) -> Option<String> {
        self.best_token_in(content, 0, content.len())
    }

    /// Pick the best candidate token inside `content[start..end]`: an exact
    /// preferred-length digit run, then any digit run, then an uppercase
    /// alphanumeric token carrying both a digit and a letter.
    fn best_token_in(&self, content: &str, start: usize, end: usize) -> Option<String> {
        let window = &content[start..end];

        let mut fallback: Option<String> = None;
        for m in self.digit_pattern.find_iter(window) {
            if !self.accept(content, start + m.start(), start + m.end()) {
                continue;
            }
            if m.as_str().len() == self.heuristics.preferred_code_len {
                return Some(m.as_str().to_string());
            }
            if fallback.is_none() {
                fallback = Some(m.as_str().to_string());
            }
        }
        if fallback.is_some() {
            return fallback;
        }

        for m in self.alnum_pattern.find_iter(window) {
            let token = m.as_str();
            let has_digit = token.chars().any(|c| c.is_ascii_digit());
            let has_letter = token.chars().any(|c| c.is_ascii_alphabetic());
            if has_digit && has_letter && self.accept(content, start + m.start(), start + m.end())
            {
                return Some(token.to_string());
            }
        }
        None
    }

    fn accept(&self, content: &str, start: usize, end: usize) -> bool {
        self.is_valid_code(&content[start..end]) && !self.is_rejected_in_context(content, start, end)
    }

    /// Shape-level validation of a candidate token.
    pub fn is_valid_code(&self, token: &str) -> bool {
        let len = token.chars().count();
        if len < self.heuristics.min_code_len || len > self.heuristics.max_code_len {
            return false;
        }
        if !token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return false;
        }

        let lower = token.to_lowercase();
        if DICTIONARY_WORDS.contains(&lower.as_str()) {
            return false;
        }

        if token.chars().all(|c| c.is_ascii_digit()) {
            if is_calendar_year(token) {
                return false;
            }
            if is_identical_run(token) {
                return false;
            }
            if is_digit_sequence(token) {
                return false;
            }
            true
        } else {
            // Mixed tokens need both a digit and a letter to look code-like.
            token.chars().any(|c| c.is_ascii_digit())
                && token.chars().any(|c| c.is_ascii_alphabetic())
        }
    }

    /// Positional rejection: the token itself looks fine, but its surroundings
    /// mark it as money, a phone fragment, or a reference number.
    fn is_rejected_in_context(&self, content: &str, start: usize, end: usize) -> bool {
        if is_currency_context(content, start, end) {
            return true;
        }
        if is_phone_context(content, start, end) {
            return true;
        }
        if is_reference_context(content, start) {
            return true;
        }
        false
    }
}

/// Caller-held scan state for one email page session.
///
/// Suppresses re-emission of a code the session already reported, so a
/// mutation-driven rescan of an unchanged email stays quiet.
#[derive(Debug, Default)]
pub struct ScanSession {
    last_detected: Option<String>,
}

impl ScanSession {
    pub fn new() -> Self {
        ScanSession::default()
    }

    /// Run extraction and report the code only when it differs from the last
    /// one this session emitted.
    pub fn observe(
        &mut self,
        extractor: &CodeExtractor,
        content: &str,
        subject: &str,
        source: CodeSource,
    ) -> Option<String> {
        let code = extractor.extract(content, subject)?;
        if self.last_detected.as_deref() == Some(code.as_str()) {
            return None;
        }
        log::info!("detected code {code} in {source} email");
        self.last_detected = Some(code.clone());
        Some(code)
    }

    pub fn last_detected(&self) -> Option<&str> {
        self.last_detected.as_deref()
    }
}

fn is_calendar_year(token: &str) -> bool {
    token.len() == 4 && (token.starts_with("19") || token.starts_with("20"))
}

fn is_identical_run(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => false,
    }
}

fn is_digit_sequence(token: &str) -> bool {
    let digits: Vec<i32> = token.chars().filter_map(|c| c.to_digit(10)).map(|d| d as i32).collect();
    if digits.len() < 4 {
        return false;
    }
    let ascending = digits.windows(2).all(|w| w[1] - w[0] == 1);
    let descending = digits.windows(2).all(|w| w[0] - w[1] == 1);
    ascending || descending
}

fn is_currency_context(content: &str, start: usize, end: usize) -> bool {
    // Walk left over the digit grouping the token sits in, then look for a
    // currency symbol glued to its front.
    let prefix = &content[..start];
    let trimmed = prefix.trim_end_matches(|c: char| c.is_ascii_digit() || c == ',' || c == '.');
    if trimmed.ends_with('$') || trimmed.ends_with('€') || trimmed.ends_with('£')
        || trimmed.ends_with('¥')
    {
        return true;
    }

    // Comma-grouped thousands: ",700" in "$210,700" or "210," before "700".
    let before: Vec<char> = prefix.chars().rev().take(2).collect();
    if before.first() == Some(&',') && before.get(1).is_some_and(|c| c.is_ascii_digit()) {
        return true;
    }
    let after: Vec<char> = content[end..].chars().take(2).collect();
    if after.first() == Some(&',') && after.get(1).is_some_and(|c| c.is_ascii_digit()) {
        return true;
    }

    // Currency word shortly before the token.
    let window_start = floor_char_boundary(content, start.saturating_sub(20));
    let nearby = content[window_start..start].to_lowercase();
    CURRENCY_WORDS.iter().any(|w| nearby.contains(w))
}

fn is_phone_context(content: &str, start: usize, end: usize) -> bool {
    // A separator glued to more digits on either side means the token is a
    // fragment of a longer number, e.g. 555-123-4567 or +1 (800) 5551234.
    let before: Vec<char> = content[..start].chars().rev().take(2).collect();
    if let (Some(sep), Some(ctx)) = (before.first(), before.get(1)) {
        if matches!(sep, '-' | '.' | ')') && (ctx.is_ascii_digit() || *ctx == '(') {
            return true;
        }
        if *sep == ' ' && *ctx == ')' {
            return true;
        }
    }
    if content[..start].ends_with('+') {
        return true;
    }
    let after: Vec<char> = content[end..].chars().take(2).collect();
    if let (Some(sep), Some(ctx)) = (after.first(), after.get(1)) {
        if matches!(sep, '-' | '.') && ctx.is_ascii_digit() {
            return true;
        }
    }
    false
}

fn is_reference_context(content: &str, start: usize) -> bool {
    let window_start = floor_char_boundary(content, start.saturating_sub(30));
    REFERENCE_PREFIX.is_match(&content[window_start..start])
}

/// Largest char boundary not past `index` (emails are not always ASCII).
fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> CodeExtractor {
        CodeExtractor::new(&Heuristics::default()).unwrap()
    }

    #[test]
    fn test_no_context_no_code() {
        let ex = extractor();
        assert_eq!(
            ex.extract("Meeting moved to room 482913 tomorrow at 10.", "Schedule change"),
            None
        );
        assert_eq!(ex.extract("Your invoice total is 553210.", "Invoice"), None);
    }

    #[test]
    fn test_positional_extraction() {
        let ex = extractor();
        assert_eq!(
            ex.extract("Your verification code is: 847293. Thanks.", "Verify your account"),
            Some("847293".to_string())
        );
    }

    #[test]
    fn test_subject_alone_provides_context() {
        let ex = extractor();
        // Body has no context keyword, subject does.
        assert_eq!(
            ex.extract("847293 is all you need.", "One-time sign in"),
            Some("847293".to_string())
        );
    }

    #[test]
    fn test_order_number_not_picked() {
        let ex = extractor();
        assert_eq!(
            ex.extract(
                "Order #482913 has shipped. Verification code: 119204",
                ""
            ),
            Some("119204".to_string())
        );
    }

    #[test]
    fn test_currency_not_picked() {
        let ex = extractor();
        assert_eq!(
            ex.extract(
                "Your balance is $210,700. Your one-time code is: 553210",
                ""
            ),
            Some("553210".to_string())
        );
    }

    #[test]
    fn test_proximity_search() {
        let ex = extractor();
        // No anchored phrase, but a 6-digit token near "two-factor".
        assert_eq!(
            ex.extract("Use 392817 to finish two-factor setup.", ""),
            Some("392817".to_string())
        );
    }

    #[test]
    fn test_proximity_window_aligned_despite_multibyte_case() {
        let ex = extractor();
        // 'İ' lowercases to two chars, so offsets taken from a lowercased
        // copy would drift past the real keyword position and miss the code.
        let content = format!("{} 392817 two-factor", "İ".repeat(60));
        assert_eq!(
            ex.extract_near_keywords(&content),
            Some("392817".to_string())
        );
    }

    #[test]
    fn test_global_fallback_prefers_six_digits() {
        let ex = extractor();
        // Subject supplies context; body has a 4-digit and a 6-digit token.
        assert_eq!(
            ex.extract("Gate 7731. Token 392817 ready.", "Security alert"),
            Some("392817".to_string())
        );
    }

    #[test]
    fn test_alphanumeric_code() {
        let ex = extractor();
        assert_eq!(
            ex.extract("Enter this code: X7K9P2 to continue.", "Verify"),
            Some("X7K9P2".to_string())
        );
    }

    #[test]
    fn test_rejects_years_runs_and_sequences() {
        let ex = extractor();
        assert!(!ex.is_valid_code("2024"));
        assert!(!ex.is_valid_code("1999"));
        assert!(!ex.is_valid_code("000000"));
        assert!(!ex.is_valid_code("777777"));
        assert!(!ex.is_valid_code("123456"));
        assert!(!ex.is_valid_code("987654"));
        assert!(ex.is_valid_code("847293"));
        assert!(ex.is_valid_code("7731"));
    }

    #[test]
    fn test_rejects_dictionary_words_and_pure_letters() {
        let ex = extractor();
        assert!(!ex.is_valid_code("WELCOME"));
        assert!(!ex.is_valid_code("ACCOUNT"));
        // Pure-letter tokens are never codes.
        assert!(!ex.is_valid_code("ABCDEF"));
        assert!(ex.is_valid_code("X7K9P2"));
    }

    #[test]
    fn test_phone_fragments_rejected() {
        let ex = extractor();
        // Subject provides context; only number present is a phone fragment.
        assert_eq!(
            ex.extract("Call us at 555-123-4567 to verify.", "Verify"),
            None
        );
    }

    #[test]
    fn test_year_skipped_in_favour_of_code() {
        let ex = extractor();
        assert_eq!(
            ex.extract("Copyright 2024. Your verification code is: 8472", ""),
            Some("8472".to_string())
        );
    }

    #[test]
    fn test_scan_session_suppresses_repeat() {
        let ex = extractor();
        let mut session = ScanSession::new();
        let content = "Your verification code is: 847293.";
        assert_eq!(
            session.observe(&ex, content, "", CodeSource::Gmail),
            Some("847293".to_string())
        );
        // Same email rescanned after a DOM mutation: stays quiet.
        assert_eq!(session.observe(&ex, content, "", CodeSource::Gmail), None);
        // A different code is reported again.
        assert_eq!(
            session.observe(&ex, "Your verification code is: 102938.", "", CodeSource::Gmail),
            Some("102938".to_string())
        );
    }

    #[test]
    fn test_non_ascii_content_near_keyword() {
        let ex = extractor();
        // Window clamping must not split multi-byte chars.
        assert_eq!(
            ex.extract("Olá! Confirmação — your verification code is: 481516 ✔", ""),
            Some("481516".to_string())
        );
    }
}
