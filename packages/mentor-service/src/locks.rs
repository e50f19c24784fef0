//! Per-student critical sections. Entries live only while some caller holds or awaits them.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = HashMap<Uuid, Arc<AsyncMutex<()>>>;

#[derive(Default)]
pub(crate) struct StudentLocks {
	inner: Arc<Mutex<LockMap>>,
}
impl StudentLocks {
	pub(crate) async fn acquire(&self, student_id: Uuid) -> StudentGuard {
		let lock = lock_map(&self.inner)
			.entry(student_id)
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();
		let guard = lock.lock_owned().await;

		StudentGuard { guard: Some(guard), student_id, locks: self.inner.clone() }
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		lock_map(&self.inner).len()
	}
}

/// Releases the student's lock on drop and forgets the entry once nobody else references it.
pub(crate) struct StudentGuard {
	guard: Option<OwnedMutexGuard<()>>,
	student_id: Uuid,
	locks: Arc<Mutex<LockMap>>,
}
impl Drop for StudentGuard {
	fn drop(&mut self) {
		self.guard.take();

		let mut locks = lock_map(&self.locks);

		// Waiters hold a clone, so a count of one means only the map references it.
		if locks.get(&self.student_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
			locks.remove(&self.student_id);
		}
	}
}

fn lock_map(map: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
	map.lock().unwrap_or_else(|err| err.into_inner())
}
