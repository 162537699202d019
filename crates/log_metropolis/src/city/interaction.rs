use super::store::CityStore;

/// Pointer events supplied by the host input layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerEvent {
    Enter(String),
    Leave(String),
    Click(String),
    /// Click that hit no building.
    Missed,
}

/// Applies one pointer event to the store. Returns whether the store changed.
pub fn route(store: &mut CityStore, event: &PointerEvent) -> bool {
    match event {
        PointerEvent::Enter(id) => store.set_hovered(Some(id.as_str())),
        PointerEvent::Leave(id) => {
            // An Enter for the neighbouring building may already have landed.
            if store.hovered_id() == Some(id.as_str()) {
                store.set_hovered(None)
            } else {
                false
            }
        }
        PointerEvent::Click(id) => store.set_selected(Some(id.as_str())),
        PointerEvent::Missed => store.set_selected(None),
    }
}

pub fn close_inspector(store: &mut CityStore) -> bool {
    store.set_selected(None)
}

/// Turns a per-frame hit-test result into entity-scoped enter/leave events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerTracker {
    over: Option<String>,
}

impl PointerTracker {
    pub fn over(&self) -> Option<&str> {
        self.over.as_deref()
    }

    pub fn update(&mut self, hit: Option<&str>) -> Vec<PointerEvent> {
        if self.over.as_deref() == hit {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(2);
        if let Some(previous) = self.over.take() {
            events.push(PointerEvent::Leave(previous));
        }
        if let Some(id) = hit {
            events.push(PointerEvent::Enter(id.to_string()));
            self.over = Some(id.to_string());
        }
        events
    }

    pub fn click(&self) -> PointerEvent {
        match &self.over {
            Some(id) => PointerEvent::Click(id.clone()),
            None => PointerEvent::Missed,
        }
    }
}
