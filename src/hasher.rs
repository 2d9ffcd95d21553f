//! Bounded SHA-256 hashing pool.
//!
//! Hashing runs on `spawn_blocking` workers fed through a bounded channel
//! so a large response body can never stall the event dispatcher that
//! drives the devtools connection.

use sha2::{Digest, Sha256};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;

struct Job {
    bytes: Vec<u8>,
    reply: oneshot::Sender<String>,
}

/// Handle to the process-global hashing pool. Cheap to clone; cloning
/// shares the same worker pool.
#[derive(Clone)]
pub struct Hasher {
    tx: Sender<Job>,
}

impl Hasher {
    /// Spawns `workers` blocking tasks, each consuming from a shared
    /// bounded job queue.
    pub fn spawn(workers: usize) -> Hasher {
        let (tx, rx) = mpsc::channel::<Job>(workers.max(1) * 4);
        let rx = std::sync::Arc::new(tokio::sync::Mutex::new(rx));

        for _ in 0..workers.max(1) {
            let rx = rx.clone();
            tokio::task::spawn(async move { Self::worker_loop(rx).await });
        }

        Hasher { tx }
    }

    async fn worker_loop(rx: std::sync::Arc<tokio::sync::Mutex<Receiver<Job>>>) {
        loop {
            let job = {
                let mut guard = rx.lock().await;
                guard.recv().await
            };
            let Some(job) = job else { break };

            let digest = tokio::task::spawn_blocking(move || {
                let mut hasher = Sha256::new();
                hasher.update(&job.bytes);
                (hex::encode(hasher.finalize()), job.reply)
            })
            .await;

            if let Ok((hex_digest, reply)) = digest {
                let _ = reply.send(hex_digest);
            }
        }
    }

    /// Hashes `bytes` on the pool and returns the lowercase hex digest.
    pub async fn hash(&self, bytes: Vec<u8>) -> anyhow::Result<String> {
        let (reply, recv) = oneshot::channel();
        self.tx
            .send(Job { bytes, reply })
            .await
            .map_err(|_| anyhow::anyhow!("hashing pool is shut down"))?;
        recv.await.map_err(|_| anyhow::anyhow!("hashing worker dropped the reply"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_known_input() {
        let hasher = Hasher::spawn(2);
        let digest = hasher.hash(b"hello world".to_vec()).await.unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dacefbe65e1f6a2e2012da66b4d03e3a8e6a9"
        );
    }

    #[tokio::test]
    async fn concurrent_jobs_all_complete() {
        let hasher = Hasher::spawn(4);
        let mut handles = Vec::new();
        for i in 0..20u8 {
            let hasher = hasher.clone();
            handles.push(tokio::spawn(async move { hasher.hash(vec![i; 16]).await.unwrap() }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().len(), 64);
        }
    }
}
