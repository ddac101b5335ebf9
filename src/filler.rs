use crate::classifier::{FieldClassifier, FillTarget};
use crate::dom::{MutationEvent, PageDom, SyntheticEvent};
use crate::heuristics::Heuristics;
use std::time::Duration;
use tokio::sync::mpsc;

/// Event order a reactive front-end observes per filled field. The value is
/// assigned through the platform setter before `Input` fires, so state bound
/// to the input sees the new value.
const FILL_EVENTS: &[SyntheticEvent] = &[
    SyntheticEvent::Focus,
    SyntheticEvent::KeyDown,
    SyntheticEvent::Input,
    SyntheticEvent::KeyUp,
    SyntheticEvent::Change,
    SyntheticEvent::Blur,
];

/// Types a code into a page through the [`PageDom`] seam.
pub struct CodeFiller {
    classifier: FieldClassifier,
    heuristics: Heuristics,
}

impl CodeFiller {
    pub fn new(heuristics: &Heuristics) -> Self {
        CodeFiller {
            classifier: FieldClassifier::new(heuristics),
            heuristics: heuristics.clone(),
        }
    }

    /// One full search-and-fill pass. Returns true when the code landed.
    pub fn try_fill<P: PageDom>(&self, page: &mut P, code: &str) -> bool {
        let inputs = page.inputs();
        let Some(target) = self.classifier.select(&inputs, code) else {
            return false;
        };
        self.fill(page, &target, code)
    }

    /// Fill a previously selected target. A field that picked up a value
    /// since selection is left alone.
    pub fn fill<P: PageDom>(&self, page: &mut P, target: &FillTarget, code: &str) -> bool {
        let filled_field = match target {
            FillTarget::Single(id) => {
                if !self.fill_one(page, *id, code) {
                    return false;
                }
                *id
            }
            FillTarget::Multiple(ids) => {
                let mut last = None;
                for (id, ch) in ids.iter().zip(code.chars()) {
                    if self.fill_one(page, *id, &ch.to_string()) {
                        last = Some(*id);
                    }
                }
                match last {
                    Some(id) => id,
                    None => return false,
                }
            }
        };

        log::info!("filled code into field {filled_field}");
        if self.heuristics.auto_submit {
            if page.submit_near(filled_field) {
                log::debug!("triggered submit near field {filled_field}");
            }
        }
        true
    }

    fn fill_one<P: PageDom>(&self, page: &mut P, id: u64, value: &str) -> bool {
        // No events for an element that vanished between scan and fill, and
        // never overwrite user input.
        let Some(field) = page.inputs().into_iter().find(|f| f.id == id) else {
            log::debug!("field {id} no longer present, skipping");
            return false;
        };
        if !field.value.is_empty() {
            log::debug!("field {id} already holds a value, skipping");
            return false;
        }

        page.dispatch(id, SyntheticEvent::Focus);
        page.dispatch(id, SyntheticEvent::KeyDown);
        if !page.set_native_value(id, value) {
            // Vanished after the check above; not an error.
            return false;
        }
        for event in &FILL_EVENTS[2..] {
            page.dispatch(id, *event);
        }
        true
    }

    /// Fill now if possible, otherwise keep retrying on DOM mutations until
    /// the observation window closes. Gives up silently.
    pub async fn fill_when_ready<P: PageDom>(
        &self,
        page: &mut P,
        code: &str,
        mutations: &mut mpsc::Receiver<MutationEvent>,
    ) -> bool {
        if self.try_fill(page, code) {
            return true;
        }

        let window = Duration::from_secs(self.heuristics.watch_timeout_secs);
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    log::debug!("observation window closed without a fillable field");
                    return false;
                }
                event = mutations.recv() => {
                    match event {
                        Some(_) => {
                            if self.try_fill(page, code) {
                                return true;
                            }
                        }
                        // Observer torn down; nothing more will appear.
                        None => return false,
                    }
                }
            }
        }
    }
}
