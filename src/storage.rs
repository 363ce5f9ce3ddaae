use async_trait::async_trait;
use std::sync::Mutex;

#[async_trait]
pub trait Storage: Send + Sync {
    // None on any failure: short read, io error, offset past the end
    async fn get(&self, offset: u64, length: u64) -> Option<Vec<u8>>;

    async fn set(&self, offset: u64, data: &[u8]) -> bool;

    fn exists(&self) -> bool;
}

pub struct MemoryStorage {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryStorage {
    pub fn new(total_length: u64) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; total_length as usize]),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, offset: u64, length: u64) -> Option<Vec<u8>> {
        let bytes = self.bytes.lock().unwrap();
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(length).ok()?)?;
        bytes.get(start..end).map(<[u8]>::to_vec)
    }

    async fn set(&self, offset: u64, data: &[u8]) -> bool {
        let mut bytes = self.bytes.lock().unwrap();
        let Ok(start) = usize::try_from(offset) else {
            return false;
        };
        let Some(end) = start.checked_add(data.len()) else {
            return false;
        };
        let Some(dst) = bytes.get_mut(start..end) else {
            return false;
        };
        dst.copy_from_slice(data);
        true
    }

    fn exists(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_write() {
        let storage = MemoryStorage::new(16);
        assert!(storage.set(4, b"abcd").await);
        assert_eq!(storage.get(4, 4).await, Some(b"abcd".to_vec()));
    }

    #[tokio::test]
    async fn get_past_end_returns_none() {
        let storage = MemoryStorage::new(4);
        assert_eq!(storage.get(2, 10).await, None);
    }

    #[tokio::test]
    async fn set_past_end_returns_false() {
        let storage = MemoryStorage::new(4);
        assert!(!storage.set(2, b"12345").await);
    }
}
