// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Resources acquired "as" an impersonated identity.
//!
//! Every handle opened inside an impersonation context is registered in that
//! context's [`ResourceScope`] and released when the context is torn down.

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine_core::errors::CleanupWarning;

pub trait ScopedResource: Send + Sync {
    /// Short label for logs, e.g. `fs:/srv/data`
    fn describe(&self) -> String;

    fn release(&self) -> io::Result<()>;
}

#[derive(Default)]
pub struct ResourceScope {
    entries: Mutex<Vec<Arc<dyn ScopedResource>>>,
    released: AtomicBool,
}

impl ResourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `resource` until teardown. Fails once the scope has been released.
    pub fn register(&self, resource: Arc<dyn ScopedResource>) -> io::Result<()> {
        let mut entries = self.entries.lock();
        if self.released.load(Ordering::Acquire) {
            return Err(io::Error::other(format!(
                "identity scope already torn down, refusing {}",
                resource.describe()
            )));
        }
        debug!("Registered scoped resource {}", resource.describe());
        entries.push(resource);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Release everything in reverse acquisition order.
    ///
    /// Failures are collected, logged and returned; they never stop the
    /// remaining releases. Calling this twice releases nothing the second time.
    pub fn release_all(&self, user: &str) -> Vec<CleanupWarning> {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            self.released.store(true, Ordering::Release);
            entries.drain(..).collect()
        };

        let mut warnings = Vec::new();
        for resource in drained.into_iter().rev() {
            if let Err(source) = resource.release() {
                let warning = CleanupWarning {
                    resource: resource.describe(),
                    user: user.to_string(),
                    source,
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
        warnings
    }
}

impl std::fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceScope")
            .field("entries", &self.len())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Probe {
        name: &'static str,
        fail: bool,
        order: Arc<Mutex<Vec<&'static str>>>,
        releases: AtomicUsize,
    }

    impl ScopedResource for Probe {
        fn describe(&self) -> String {
            self.name.to_string()
        }

        fn release(&self) -> io::Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.order.lock().push(self.name);
            if self.fail {
                Err(io::Error::other("stuck"))
            } else {
                Ok(())
            }
        }
    }

    fn probe(name: &'static str, fail: bool, order: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Probe> {
        Arc::new(Probe {
            name,
            fail,
            order: Arc::clone(order),
            releases: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_release_is_lifo_and_survives_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let scope = ResourceScope::new();
        let first = probe("first", false, &order);
        let broken = probe("broken", true, &order);
        let last = probe("last", false, &order);
        scope.register(first.clone()).unwrap();
        scope.register(broken.clone()).unwrap();
        scope.register(last.clone()).unwrap();

        let warnings = scope.release_all("alice");

        assert_eq!(*order.lock(), vec!["last", "broken", "first"]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].resource, "broken");
        assert_eq!(warnings[0].user, "alice");
        assert!(scope.is_empty());
    }

    #[test]
    fn test_second_release_is_noop_and_late_register_refused() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let scope = ResourceScope::new();
        let handle = probe("fs", false, &order);
        scope.register(handle.clone()).unwrap();

        assert!(scope.release_all("alice").is_empty());
        assert!(scope.release_all("alice").is_empty());
        assert_eq!(handle.releases.load(Ordering::SeqCst), 1);

        assert!(scope.register(probe("late", false, &order)).is_err());
    }
}
