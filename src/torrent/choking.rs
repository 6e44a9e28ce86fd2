use super::{TorrentError, TorrentState};
use crate::config::ChokingConfig;
use rand::Rng as _;
use std::cmp::Ordering;

/// Which rate orders peers for unchoking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBy {
    /// Fastest uploaders to us first (tit-for-tat while downloading).
    Download,
    /// Fastest downloaders from us first (while seeding).
    Upload,
}

impl RankBy {
    pub fn for_state(state: TorrentState) -> Result<Self, TorrentError> {
        match state {
            TorrentState::Sharing => Ok(RankBy::Download),
            TorrentState::Seeding => Ok(RankBy::Upload),
            state => Err(TorrentError::InvalidState {
                state,
                operation: "peer ranking",
            }),
        }
    }

    fn rate(self, candidate: &Candidate) -> f64 {
        match self {
            RankBy::Download => candidate.download_rate,
            RankBy::Upload => candidate.upload_rate,
        }
    }
}

/// Snapshot of one connected peer taken for a scheduler pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Candidate {
    pub download_rate: f64,
    pub upload_rate: f64,
    /// We currently choke the peer.
    pub choking: bool,
    /// The peer is interested in us.
    pub interested: bool,
}

/// Decisions of one pass, as indices into the candidate slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChokePlan {
    pub unchoke: Vec<usize>,
    pub choke: Vec<usize>,
    /// Peer spared from choking this round; it is unchoked too.
    pub optimistic: Option<usize>,
}

/// Picks the optimistic unchoke among `len` peers.
pub trait OptimisticPicker: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

/// Uniform random pick.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPicker;

impl OptimisticPicker for RandomPicker {
    fn pick(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

#[derive(Debug, Clone)]
pub struct ChokingAlgorithm {
    max_unchoked: usize,
}

impl ChokingAlgorithm {
    pub fn new(config: &ChokingConfig) -> Self {
        Self {
            max_unchoked: config.max_unchoked,
        }
    }

    pub fn max_unchoked(&self) -> usize {
        self.max_unchoked
    }

    /// Computes one scheduler pass.
    ///
    /// Peers are walked from the best rate down. While fewer than
    /// `max_unchoked` interested peers have been passed, each peer is left
    /// (or made) unchoked; every later peer goes to the choke set. On an
    /// optimistic pass one member of the choke set, drawn by `picker` over
    /// the whole set, is unchoked instead.
    pub fn plan(
        &self,
        candidates: &[Candidate],
        rank: RankBy,
        optimistic: bool,
        picker: &dyn OptimisticPicker,
    ) -> ChokePlan {
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            rank.rate(&candidates[b])
                .partial_cmp(&rank.rate(&candidates[a]))
                .unwrap_or(Ordering::Equal)
        });

        let mut plan = ChokePlan::default();
        let mut downloaders = 0;
        for index in order {
            let candidate = &candidates[index];
            if downloaders < self.max_unchoked {
                if candidate.interested {
                    downloaders += 1;
                }
                if candidate.choking {
                    plan.unchoke.push(index);
                }
            } else {
                plan.choke.push(index);
            }
        }

        if optimistic && !plan.choke.is_empty() {
            let pick = picker.pick(plan.choke.len()).min(plan.choke.len() - 1);
            plan.optimistic = Some(plan.choke.remove(pick));
        }

        plan
    }
}

impl Default for ChokingAlgorithm {
    fn default() -> Self {
        Self::new(&ChokingConfig::default())
    }
}
