use std::sync::Arc;
use swipeduel_model::{Block, Gender};
use tracing::{debug, warn};

use crate::infra::api::RatingApi;

/// Requests fixed-size blocks of image records.
///
/// Failures never escape: they are logged and reported as `None` so the
/// queue can leave its state untouched.
#[derive(Debug, Clone)]
pub struct BlockFetcher {
    api: Arc<dyn RatingApi>,
    block_size: usize,
}

impl BlockFetcher {
    /// `block_size` is rounded down to an even count of at least 2.
    pub fn new(api: Arc<dyn RatingApi>, block_size: usize) -> Self {
        let block_size = (block_size & !1).max(2);
        Self { api, block_size }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub async fn fetch_block(&self, gender: Gender) -> Option<Block> {
        let mut block = match self.api.fetch_block(gender, self.block_size).await
        {
            Ok(block) => block,
            Err(err) => {
                warn!(%gender, error = %err, "block fetch failed");
                return None;
            }
        };

        if block.len() % 2 == 1 {
            warn!(
                %gender,
                len = block.len(),
                "odd-sized block; dropping the unpaired record"
            );
            block.pop();
        }

        if block.is_empty() {
            warn!(%gender, "block fetch returned no records");
            return None;
        }

        debug!(%gender, len = block.len(), "block fetched");
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::testing::{StubApi, fixture_block};

    #[test]
    fn block_size_is_forced_even() {
        let api = Arc::new(StubApi::new());
        assert_eq!(BlockFetcher::new(api.clone(), 11).block_size(), 10);
        assert_eq!(BlockFetcher::new(api, 0).block_size(), 2);
    }

    #[tokio::test]
    async fn failure_and_empty_blocks_yield_none() {
        let api = Arc::new(StubApi::new());
        api.push_block_failure();
        api.push_block(Vec::new());
        let fetcher = BlockFetcher::new(api.clone(), 10);

        assert!(fetcher.fetch_block(Gender::Male).await.is_none());
        assert!(fetcher.fetch_block(Gender::Male).await.is_none());
        assert_eq!(api.block_requests(), 2);
    }

    #[tokio::test]
    async fn odd_block_loses_trailing_record() {
        let api = Arc::new(StubApi::new());
        api.push_block(fixture_block(Gender::Female, 0, 7));
        let fetcher = BlockFetcher::new(api, 10);

        let block = fetcher.fetch_block(Gender::Female).await.unwrap();
        assert_eq!(block.len(), 6);
        assert_eq!(block[5].id.as_str(), "img-5");
    }
}
