//! Push-notification hooks fired after successful lifecycle writes.
//!
//! Hooks run after the change has committed. They cannot veto it and their
//! delivery mechanics are the collaborator's concern.

use crate::model::department::DepartmentId;
use crate::model::notice::{Notice, NoticeId, Priority};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

/// Payload handed to hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoticeEvent {
    pub notice_id: NoticeId,
    pub title: String,
    pub priority: Priority,
    pub target_department_ids: Vec<DepartmentId>,
}

impl From<&Notice> for NoticeEvent {
    fn from(notice: &Notice) -> Self {
        Self {
            notice_id: notice.uuid,
            title: notice.title.clone(),
            priority: notice.priority,
            target_department_ids: notice.target_department_ids.clone(),
        }
    }
}

/// Receiver of lifecycle events.
pub trait NoticeHook: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Called after a notice has been circulated.
    fn on_circulated(&self, event: &NoticeEvent);

    /// Called after a notice has been approved or re-approved.
    fn on_approved(&self, _event: &NoticeEvent) {}
}

/// Ordered set of registered hooks.
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn NoticeHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn NoticeHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Returns hook names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.hooks
            .iter()
            .map(|hook| hook.name().to_string())
            .collect()
    }

    pub fn emit_approved(&self, notice: &Notice) {
        let event = NoticeEvent::from(notice);
        for hook in &self.hooks {
            debug!(
                "event=hook_dispatch module=hooks status=ok hook={} kind=approved notice_id={}",
                hook.name(),
                event.notice_id
            );
            hook.on_approved(&event);
        }
    }

    pub fn emit_circulated(&self, notice: &Notice) {
        let event = NoticeEvent::from(notice);
        for hook in &self.hooks {
            debug!(
                "event=hook_dispatch module=hooks status=ok hook={} kind=circulated notice_id={}",
                hook.name(),
                event.notice_id
            );
            hook.on_circulated(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HookRegistry, NoticeEvent, NoticeHook};
    use crate::model::notice::NewNotice;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        circulated: Mutex<Vec<NoticeEvent>>,
    }

    impl NoticeHook for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_circulated(&self, event: &NoticeEvent) {
            self.circulated.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn registry_dispatches_in_registration_order() {
        let recorder = Arc::new(Recorder::default());
        let mut registry = HookRegistry::new();
        assert!(registry.is_empty());
        registry.register(recorder.clone());
        assert_eq!(registry.names(), vec!["recorder".to_string()]);

        let notice = NewNotice::new("Holiday Notice", "Office closed", "high")
            .into_notice(Uuid::new_v4(), 1)
            .unwrap();
        registry.emit_approved(&notice);
        assert!(recorder.circulated.lock().unwrap().is_empty());

        registry.emit_circulated(&notice);
        let events = recorder.circulated.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Holiday Notice");
    }
}
