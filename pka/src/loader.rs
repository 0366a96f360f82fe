/*++

Licensed under the Apache-2.0 license.

File Name:

    loader.rs

Abstract:

    File contains the platform firmware-loading collaborator interface.

--*/

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;

/// Completion callback of an asynchronous firmware fetch. Invoked with the
/// blob bytes, or `None` when the platform has no such blob.
pub type FwCallback = Box<dyn FnOnce(Option<Vec<u8>>) + Send + 'static>;

/// Asynchronous firmware fetch service.
///
/// The platform analogue fetches a named blob in the background and invokes
/// the callback from its own context; callers must not assume the callback
/// runs on the requesting thread.
pub trait FirmwareLoader: Send + Sync {
    fn request(&self, name: &str, done: FwCallback);
}

/// Loader serving blobs from an in-memory table on a background thread.
pub struct MemLoader {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemLoader {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, name: &str, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(name.to_string(), bytes);
    }
}

impl Default for MemLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareLoader for MemLoader {
    fn request(&self, name: &str, done: FwCallback) {
        let blob = self.blobs.lock().unwrap().get(name).cloned();
        thread::spawn(move || done(blob));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_mem_loader_delivers() {
        let loader = MemLoader::new();
        loader.insert("pka.elpfw", vec![1, 2, 3]);
        let (tx, rx) = mpsc::channel();
        loader.request("pka.elpfw", Box::new(move |b| tx.send(b).unwrap()));
        assert_eq!(rx.recv().unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_mem_loader_missing() {
        let loader = MemLoader::new();
        let (tx, rx) = mpsc::channel();
        loader.request("nope", Box::new(move |b| tx.send(b).unwrap()));
        assert_eq!(rx.recv().unwrap(), None);
    }
}
