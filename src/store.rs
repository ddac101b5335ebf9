use crate::heuristics::Heuristics;
use crate::provider::CodeSource;
use serde::{Deserialize, Serialize};

/// A verification code observed in email content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedCode {
    pub value: String,
    pub source: CodeSource,
    pub detected_at_ms: i64,
}

impl DetectedCode {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.detected_at_ms
    }

    pub fn is_expired_at(&self, now_ms: i64, window_ms: i64) -> bool {
        self.age_ms(now_ms) > window_ms
    }
}

/// One user-visible history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub code: String,
    pub source: CodeSource,
    pub timestamp: i64,
}

/// One dedup-window row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenCode {
    pub code: String,
    pub timestamp: i64,
}

/// The persisted key-value document, kept bit-compatible with the storage
/// layout the extension writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredState {
    pub current_code: Option<String>,
    pub code_source: Option<CodeSource>,
    pub code_timestamp: Option<i64>,
    pub code_history: Vec<HistoryEntry>,
    pub detected_codes_with_time: Vec<SeenCode>,
    pub auto_paste_enabled: bool,
}

impl Default for StoredState {
    fn default() -> Self {
        StoredState {
            current_code: None,
            code_source: None,
            code_timestamp: None,
            code_history: Vec::new(),
            detected_codes_with_time: Vec::new(),
            auto_paste_enabled: true,
        }
    }
}

/// What a target page gets back when it asks for the current code.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// Present only when a fresh code exists and auto-paste is on.
    pub code: Option<DetectedCode>,
    pub auto_paste_enabled: bool,
}

impl FetchResult {
    /// The degraded answer used when the coordinating process is gone.
    pub fn unavailable() -> Self {
        FetchResult {
            code: None,
            auto_paste_enabled: true,
        }
    }
}

/// Current-code view for the popup. Expired codes are shown struck-through
/// rather than deleted, so `expired` is a display attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeDisplay {
    pub value: String,
    pub source: CodeSource,
    pub expired: bool,
}

/// The extension-wide volatile store: last detected code, rolling history,
/// and the duplicate-suppression window. Lives for the browser session
/// unless the host persists [`StoredState`].
#[derive(Debug, Clone)]
pub struct CodeStore {
    state: StoredState,
    heuristics: Heuristics,
}

impl CodeStore {
    pub fn new(heuristics: &Heuristics) -> Self {
        CodeStore {
            state: StoredState::default(),
            heuristics: heuristics.clone(),
        }
    }

    pub fn from_state(state: StoredState, heuristics: &Heuristics) -> Self {
        CodeStore {
            state,
            heuristics: heuristics.clone(),
        }
    }

    pub fn state(&self) -> &StoredState {
        &self.state
    }

    pub fn into_state(self) -> StoredState {
        self.state
    }

    /// Record a newly detected code. Returns false when the code was already
    /// seen within the freshness window (no history entry, no signal).
    pub fn publish(&mut self, code: &str, source: CodeSource) -> bool {
        self.publish_at(code, source, now_ms())
    }

    pub fn publish_at(&mut self, code: &str, source: CodeSource, now_ms: i64) -> bool {
        let window_ms = self.heuristics.freshness_window_ms();

        // Entries older than the freshness window no longer suppress anything.
        self.state
            .detected_codes_with_time
            .retain(|seen| now_ms - seen.timestamp <= window_ms);

        if self
            .state
            .detected_codes_with_time
            .iter()
            .any(|seen| seen.code == code)
        {
            log::debug!("code {code} already seen within freshness window, suppressed");
            return false;
        }

        self.state.detected_codes_with_time.insert(
            0,
            SeenCode {
                code: code.to_string(),
                timestamp: now_ms,
            },
        );
        self.state
            .detected_codes_with_time
            .truncate(self.heuristics.dedup_cap);

        self.state.code_history.insert(
            0,
            HistoryEntry {
                code: code.to_string(),
                source,
                timestamp: now_ms,
            },
        );
        self.state.code_history.truncate(self.heuristics.history_cap);

        self.state.current_code = Some(code.to_string());
        self.state.code_source = Some(source);
        self.state.code_timestamp = Some(now_ms);

        log::info!("published code {code} from {source}");
        true
    }

    /// The current code, only while fresh and only when auto-paste is on.
    pub fn fetch_current(&self) -> FetchResult {
        self.fetch_current_at(now_ms())
    }

    pub fn fetch_current_at(&self, now_ms: i64) -> FetchResult {
        let auto_paste_enabled = self.state.auto_paste_enabled;
        let code = if auto_paste_enabled {
            self.current_at(now_ms)
        } else {
            None
        };
        FetchResult {
            code,
            auto_paste_enabled,
        }
    }

    fn current_at(&self, now_ms: i64) -> Option<DetectedCode> {
        let value = self.state.current_code.clone()?;
        let detected_at_ms = self.state.code_timestamp?;
        let code = DetectedCode {
            value,
            source: self.state.code_source.unwrap_or_default(),
            detected_at_ms,
        };
        if code.is_expired_at(now_ms, self.heuristics.freshness_window_ms()) {
            None
        } else {
            Some(code)
        }
    }

    /// Clear the current code after a successful fill. History stays.
    pub fn consume(&mut self) {
        log::debug!("current code consumed");
        self.clear_current();
    }

    /// Manual clear from the popup. Same slots as consume.
    pub fn clear_current(&mut self) {
        self.state.current_code = None;
        self.state.code_source = None;
        self.state.code_timestamp = None;
    }

    pub fn set_auto_paste(&mut self, enabled: bool) {
        self.state.auto_paste_enabled = enabled;
    }

    pub fn auto_paste_enabled(&self) -> bool {
        self.state.auto_paste_enabled
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.state.code_history
    }

    /// Popup view of the current slot; expired codes stay visible until
    /// overwritten or cleared.
    pub fn current_display(&self) -> Option<CodeDisplay> {
        self.current_display_at(now_ms())
    }

    pub fn current_display_at(&self, now_ms: i64) -> Option<CodeDisplay> {
        let value = self.state.current_code.clone()?;
        let detected_at_ms = self.state.code_timestamp?;
        let expired = now_ms - detected_at_ms > self.heuristics.freshness_window_ms();
        Some(CodeDisplay {
            value,
            source: self.state.code_source.unwrap_or_default(),
            expired,
        })
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60_000;

    fn store() -> CodeStore {
        CodeStore::new(&Heuristics::default())
    }

    #[test]
    fn test_fresh_code_retrievable_then_expires() {
        let mut s = store();
        assert!(s.publish_at("847293", CodeSource::Gmail, T));

        let fresh = s.fetch_current_at(T + 9 * MINUTE);
        assert_eq!(fresh.code.as_ref().map(|c| c.value.as_str()), Some("847293"));
        assert!(fresh.auto_paste_enabled);

        let stale = s.fetch_current_at(T + 11 * MINUTE);
        assert_eq!(stale.code, None);
        assert!(stale.auto_paste_enabled);
    }

    #[test]
    fn test_auto_paste_off_hides_code() {
        let mut s = store();
        s.publish_at("847293", CodeSource::Gmail, T);
        s.set_auto_paste(false);
        let result = s.fetch_current_at(T + MINUTE);
        assert_eq!(result.code, None);
        assert!(!result.auto_paste_enabled);
    }

    #[test]
    fn test_duplicate_suppressed_within_window() {
        let mut s = store();
        assert!(s.publish_at("847293", CodeSource::Gmail, T));
        assert!(!s.publish_at("847293", CodeSource::Gmail, T + MINUTE));
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_duplicate_allowed_after_window() {
        let mut s = store();
        assert!(s.publish_at("847293", CodeSource::Gmail, T));
        // The stale dedup entry is evicted lazily on the next attempt.
        assert!(s.publish_at("847293", CodeSource::Outlook, T + 11 * MINUTE));
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.history()[0].source, CodeSource::Outlook);
    }

    #[test]
    fn test_history_capped_at_ten() {
        let mut s = store();
        for i in 0..12 {
            // Distinct non-sequential codes, one per minute.
            let code = format!("9{i:02}318");
            assert!(s.publish_at(&code, CodeSource::Yahoo, T + i * MINUTE));
        }
        assert_eq!(s.history().len(), 10);
        // Most recent first.
        assert_eq!(s.history()[0].code, "911318");
    }

    #[test]
    fn test_dedup_window_capped_at_fifty() {
        let mut heuristics = Heuristics::default();
        // Widen the freshness window so nothing ages out during the loop.
        heuristics.freshness_window_secs = 86_400;
        let mut s = CodeStore::from_state(StoredState::default(), &heuristics);
        for i in 0..60 {
            let code = format!("8{i:02}317");
            assert!(s.publish_at(&code, CodeSource::Gmail, T + i));
        }
        assert_eq!(s.state().detected_codes_with_time.len(), 50);
    }

    #[test]
    fn test_consume_clears_current_but_not_history() {
        let mut s = store();
        s.publish_at("847293", CodeSource::Gmail, T);
        s.consume();
        assert_eq!(s.fetch_current_at(T + MINUTE).code, None);
        assert_eq!(s.history().len(), 1);
        // Consuming does not reopen the dedup window.
        assert!(!s.publish_at("847293", CodeSource::Gmail, T + 2 * MINUTE));
    }

    #[test]
    fn test_expired_code_still_displayed() {
        let mut s = store();
        s.publish_at("847293", CodeSource::Gmail, T);
        let display = s.current_display_at(T + 11 * MINUTE).unwrap();
        assert_eq!(display.value, "847293");
        assert!(display.expired);
        // But a fetch for filling purposes returns nothing.
        assert_eq!(s.fetch_current_at(T + 11 * MINUTE).code, None);
    }

    #[test]
    fn test_state_document_round_trip() {
        let mut s = store();
        s.publish_at("847293", CodeSource::Gmail, T);
        let json = serde_json::to_string(s.state()).unwrap();
        // Keys match the extension's storage layout.
        assert!(json.contains("\"currentCode\":\"847293\""));
        assert!(json.contains("\"codeSource\":\"gmail\""));
        assert!(json.contains("\"codeHistory\""));
        assert!(json.contains("\"detectedCodesWithTime\""));
        assert!(json.contains("\"autoPasteEnabled\":true"));

        let state: StoredState = serde_json::from_str(&json).unwrap();
        let restored = CodeStore::from_state(state, &Heuristics::default());
        assert_eq!(
            restored.fetch_current_at(T + MINUTE).code.unwrap().value,
            "847293"
        );
    }

    #[test]
    fn test_empty_document_defaults() {
        let state: StoredState = serde_json::from_str("{}").unwrap();
        assert!(state.auto_paste_enabled);
        assert!(state.code_history.is_empty());
    }
}
