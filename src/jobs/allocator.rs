//! Sequential task numbers per daily folder.
//!
//! The next number is derived from what the folder already holds: today's folder
//! under the parent is found (or created) and its entries counted. Because a
//! report only lands in the folder once its job finishes, allocations in this
//! process are serialized and the highest number handed out per folder is
//! remembered, so quick successive submissions never share a number. Another
//! process allocating against the same folder can still collide.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::storage::{self, StorageError, StorageProvider};

/// Result of an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub folder_id: String,
    pub folder_name: String,
    pub task_number: u32,
}

pub struct TaskNumberAllocator {
    storage: Arc<dyn StorageProvider>,
    parent_folder_id: String,
    /// Highest number handed out per folder id; the lock also serializes allocations.
    reserved: Mutex<HashMap<String, u32>>,
}

impl TaskNumberAllocator {
    pub fn new(storage: Arc<dyn StorageProvider>, parent_folder_id: String) -> Self {
        Self {
            storage,
            parent_folder_id,
            reserved: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate the next task number in today's folder for `user`.
    pub async fn allocate(&self, user: &str) -> Result<Allocation, StorageError> {
        self.allocate_on(user, storage::today()).await
    }

    /// Allocate the next task number in the folder for `date`.
    pub async fn allocate_on(&self, user: &str, date: NaiveDate) -> Result<Allocation, StorageError> {
        let mut reserved = self.reserved.lock().await;

        let backend = self.storage.for_user(user).await?;
        let folder_name = storage::daily_folder_name(date);
        let folder_id = backend
            .find_or_create_folder(&self.parent_folder_id, &folder_name)
            .await?;
        let existing = u32::try_from(backend.count_entries(&folder_id).await?).unwrap_or(u32::MAX - 1);

        let last = reserved.get(&folder_id).copied().unwrap_or(0);
        let task_number = existing.max(last) + 1;
        reserved.insert(folder_id.clone(), task_number);

        tracing::info!(
            user,
            folder = %folder_name,
            existing,
            task_number,
            "Allocated task number"
        );

        Ok(Allocation {
            folder_id,
            folder_name,
            task_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::MemoryStorage;
    use crate::storage::StorageBackend;
    use bytes::Bytes;

    const PARENT: &str = "parent-folder";
    const USER: &str = "a@example.com";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    #[tokio::test]
    async fn first_allocation_creates_folder_and_starts_at_one() {
        let storage = MemoryStorage::with_users(&[USER]);
        let allocator = TaskNumberAllocator::new(Arc::new(storage.clone()), PARENT.to_string());

        let allocation = allocator.allocate_on(USER, date()).await.unwrap();
        assert_eq!(allocation.task_number, 1);
        assert_eq!(allocation.folder_name, "05-17-2024");
        assert_eq!(
            storage.folder_id(PARENT, "05-17-2024"),
            Some(allocation.folder_id.clone())
        );
    }

    #[tokio::test]
    async fn counts_existing_entries() {
        let storage = MemoryStorage::with_users(&[USER]);
        let folder = storage.find_or_create_folder(PARENT, "05-17-2024").await.unwrap();
        for i in 1..=3 {
            storage
                .upload(&folder, &format!("Task {} Output.xlsx", i), "x", Bytes::new())
                .await
                .unwrap();
        }

        let allocator = TaskNumberAllocator::new(Arc::new(storage.clone()), PARENT.to_string());
        let allocation = allocator.allocate_on(USER, date()).await.unwrap();
        assert_eq!(allocation.task_number, 4);
        assert_eq!(allocation.folder_id, folder);
    }

    #[tokio::test]
    async fn same_date_reuses_folder() {
        let storage = MemoryStorage::with_users(&[USER]);
        let allocator = TaskNumberAllocator::new(Arc::new(storage.clone()), PARENT.to_string());

        let a = allocator.allocate_on(USER, date()).await.unwrap();
        let b = allocator.allocate_on(USER, date()).await.unwrap();
        assert_eq!(a.folder_id, b.folder_id);
        assert_eq!(storage.folder_creations("05-17-2024"), 1);
    }

    #[tokio::test]
    async fn new_day_restarts_numbering() {
        let storage = MemoryStorage::with_users(&[USER]);
        let allocator = TaskNumberAllocator::new(Arc::new(storage.clone()), PARENT.to_string());

        allocator.allocate_on(USER, date()).await.unwrap();
        allocator.allocate_on(USER, date()).await.unwrap();
        let next_day = allocator
            .allocate_on(USER, date().succ_opt().unwrap())
            .await
            .unwrap();
        assert_eq!(next_day.task_number, 1);
        assert_eq!(next_day.folder_name, "05-18-2024");
    }

    #[tokio::test]
    async fn concurrent_allocations_get_distinct_numbers() {
        let storage = MemoryStorage::with_users(&[USER]);
        let allocator = Arc::new(TaskNumberAllocator::new(
            Arc::new(storage.clone()),
            PARENT.to_string(),
        ));

        let first = {
            let allocator = Arc::clone(&allocator);
            tokio::spawn(async move { allocator.allocate_on(USER, date()).await })
        };
        let second = {
            let allocator = Arc::clone(&allocator);
            tokio::spawn(async move { allocator.allocate_on(USER, date()).await })
        };
        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();

        // Nothing was uploaded in between, yet the numbers differ.
        let mut numbers = vec![a.task_number, b.task_number];
        numbers.sort();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(a.folder_id, b.folder_id);
        assert_eq!(storage.folder_creations("05-17-2024"), 1);
    }

    #[tokio::test]
    async fn uploads_and_reservations_do_not_double_count() {
        let storage = MemoryStorage::with_users(&[USER]);
        let allocator = TaskNumberAllocator::new(Arc::new(storage.clone()), PARENT.to_string());

        let a = allocator.allocate_on(USER, date()).await.unwrap();
        storage
            .upload(&a.folder_id, "Task 1 Output.xlsx", "x", Bytes::new())
            .await
            .unwrap();
        let b = allocator.allocate_on(USER, date()).await.unwrap();
        assert_eq!(b.task_number, 2);
    }

    #[tokio::test]
    async fn unauthenticated_user_propagates_error() {
        let storage = MemoryStorage::with_users(&[]);
        let allocator = TaskNumberAllocator::new(Arc::new(storage), PARENT.to_string());

        let err = allocator.allocate_on(USER, date()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotAuthenticated(_)));
    }
}
