use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use invsync_core::{EntityKey, RemoteId};

/// State shared by every step of one run: the local-key → remote-id map,
/// the deadline and the cancellation flag.
#[derive(Debug)]
pub struct RunContext {
    ids: RwLock<HashMap<EntityKey, RemoteId>>,
    /// Parameter templates by name; shared by every part of the run.
    templates: Mutex<HashMap<String, RemoteId>>,
    deadline: Option<Instant>,
    cancel: Arc<AtomicBool>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            ids: RwLock::new(HashMap::new()),
            templates: Mutex::new(HashMap::new()),
            deadline: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bounds the whole run; records not started by then are skipped.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Shares an externally owned flag (e.g. set from a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// True once cancelled or past the deadline.
    pub fn should_stop(&self) -> bool {
        self.cancel.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn id(&self, key: &EntityKey) -> Option<RemoteId> {
        self.ids.read().ok()?.get(key).copied()
    }

    pub fn remember(&self, key: EntityKey, id: RemoteId) {
        let mut ids = match self.ids.write() {
            Ok(ids) => ids,
            Err(poisoned) => poisoned.into_inner(),
        };
        ids.insert(key, id);
    }

    /// Id of the parameter template `name`, running `resolve` at most once
    /// per name. Concurrent callers wait for the first one, so a template
    /// shared by parts of one level is created once.
    pub fn template<E>(
        &self,
        name: &str,
        resolve: impl FnOnce() -> Result<RemoteId, E>,
    ) -> Result<RemoteId, E> {
        let mut templates = match self.templates.lock() {
            Ok(templates) => templates,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(id) = templates.get(name) {
            return Ok(*id);
        }
        let id = resolve()?;
        templates.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn known_ids(&self) -> usize {
        self.ids.read().map(|ids| ids.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_and_flag_both_stop_the_run() {
        let ctx = RunContext::new();
        assert!(!ctx.should_stop());
        ctx.cancel();
        assert!(ctx.should_stop());

        let ctx = RunContext::new().with_timeout(Duration::ZERO);
        assert!(ctx.should_stop());
    }

    #[test]
    fn ids_are_shared_across_threads() {
        let ctx = RunContext::new();
        let key = EntityKey::company("Acme");
        std::thread::scope(|s| {
            s.spawn(|| ctx.remember(key.clone(), RemoteId(4)));
        });
        assert_eq!(ctx.id(&key), Some(RemoteId(4)));
        assert_eq!(ctx.known_ids(), 1);
    }

    #[test]
    fn templates_resolve_once_per_name() {
        let ctx = RunContext::new();
        let calls = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let id = ctx.template("Length", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        Ok::<_, ()>(RemoteId(9))
                    });
                    assert_eq!(id, Ok(RemoteId(9)));
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let failed = ctx.template("Finish", || Err("unreachable"));
        assert_eq!(failed, Err("unreachable"));
        assert_eq!(ctx.template("Finish", || Ok::<_, &str>(RemoteId(3))), Ok(RemoteId(3)));
    }
}
