use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use blogsphere::media::{ImageUpload, MediaError, MediaStore, StoredImage};

/// Keeps uploads in memory so tests can see what reached the media host.
#[derive(Default)]
pub struct InMemoryMediaStore {
    stored: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stored.lock().unwrap().iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage, MediaError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let public_id = format!("test/{n}");
        self.stored.lock().unwrap().insert(public_id.clone());
        Ok(StoredImage {
            url: format!("https://media.test/{public_id}/{}", image.file_name),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(MediaError::Rejected("media host unavailable".to_owned()));
        }
        self.stored.lock().unwrap().remove(public_id);
        Ok(())
    }
}
