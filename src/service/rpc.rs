//! Matchmaker service orchestration and RPC handlers
//!
//! `run_matchmaking` wraps the pure pipeline with its I/O side effects: the
//! candidate dump upload (one concurrent invocation only) and metrics. The
//! RPC handlers expose the presence stream, the latest snapshot, and
//! one-shot match building for operators.

use crate::config::settings::MATCHMAKING_STORAGE_COLLECTION;
use crate::error::{Result, RpcCode, RpcStatus};
use crate::matchmaker::balance::balance_by_ticket;
use crate::matchmaker::entry::{rated_team_strength, Candidate, RatedEntry, TicketEntry};
use crate::matchmaker::pipeline::{MatchOutcome, SkillBasedMatchmaker};
use crate::rating::model::predict_draw;
use crate::store::{
    MetricsSink, StorageClient, StorageWrite, StreamBus, StreamMode, PERMISSION_NO_READ,
    PERMISSION_NO_WRITE, SYSTEM_USER_ID,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use skillratings::weng_lin::WengLinRating;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

const LATEST_CANDIDATES_STORAGE_KEY: &str = "latestCandidates";

/// The engine's service facade
pub struct MatchmakerService {
    pipeline: Arc<SkillBasedMatchmaker>,
    store: Arc<dyn StorageClient>,
    stream: Arc<dyn StreamBus>,
    metrics: Arc<dyn MetricsSink>,
    /// Candidate dumps above this size are dropped instead of written
    dump_limit_bytes: usize,
}

impl MatchmakerService {
    pub fn new(
        pipeline: Arc<SkillBasedMatchmaker>,
        store: Arc<dyn StorageClient>,
        stream: Arc<dyn StreamBus>,
        metrics: Arc<dyn MetricsSink>,
        dump_limit_bytes: usize,
    ) -> Self {
        Self {
            pipeline,
            store,
            stream,
            metrics,
            dump_limit_bytes,
        }
    }

    pub fn pipeline(&self) -> &SkillBasedMatchmaker {
        &self.pipeline
    }

    /// Run one matchmaking tick over a candidate batch.
    pub async fn run_matchmaking(&self, candidates: Vec<Candidate>) -> MatchOutcome {
        let started = Instant::now();
        let candidate_count = candidates.len();

        self.upload_candidate_dump(&candidates).await;

        let outcome = self.pipeline.match_candidates(candidates);

        self.metrics
            .gauge_set("matchmaker_candidate_count", candidate_count as f64);
        if candidate_count > 0 {
            self.metrics.timer_record(
                "matchmaker_per_candidate",
                started.elapsed() / candidate_count as u32,
            );
        }

        outcome
    }

    /// Upload the candidate dump for operator inspection.
    ///
    /// Only one concurrent invocation performs the upload; the rest skip it
    /// silently. Failures are logged, never fatal for the tick.
    async fn upload_candidate_dump(&self, candidates: &[Candidate]) {
        let _guard = match self.pipeline.try_dump_guard() {
            Some(guard) => guard,
            None => return,
        };

        let group_id = match candidates
            .first()
            .and_then(|c| c.first())
            .and_then(|e| e.properties().group_id())
        {
            Some(id) => id.to_string(),
            None => return,
        };

        let data = match serde_json::to_string(&json!({ "candidates": candidates })) {
            Ok(data) => data,
            Err(err) => {
                error!(error = %err, "Error marshalling candidates.");
                return;
            }
        };

        if data.len() > self.dump_limit_bytes {
            error!(size = data.len(), "Candidate dump too large to write to storage.");
            return;
        }

        if let Err(err) = self
            .store
            .write(StorageWrite {
                user_id: SYSTEM_USER_ID.to_string(),
                collection: MATCHMAKING_STORAGE_COLLECTION.to_string(),
                key: LATEST_CANDIDATES_STORAGE_KEY.to_string(),
                value: data.clone(),
                permission_read: PERMISSION_NO_READ,
                permission_write: PERMISSION_NO_WRITE,
                version: String::new(),
            })
            .await
        {
            error!(error = %err, "Error writing latest candidates to storage.");
        }

        if let Err(err) = self
            .stream
            .stream_send(StreamMode::Matchmaker, &group_id, &data)
            .await
        {
            warn!(error = %err, "Error streaming candidates");
        }
    }

    /// Join the caller to the per-group matchmaking stream and return the
    /// current presences with their parsed session parameters.
    pub async fn matchmaker_stream(
        &self,
        user_id: &str,
        session_id: &str,
        request: MatchmakerStreamRequest,
    ) -> Result<MatchmakerStreamResponse> {
        if user_id.is_empty() {
            return Err(RpcStatus::new(RpcCode::Unauthenticated, "No user ID in context").into());
        }
        if session_id.is_empty() {
            return Err(
                RpcStatus::new(RpcCode::Unauthenticated, "No session ID in context").into(),
            );
        }

        let joined = self
            .stream
            .stream_user_join(StreamMode::Matchmaking, &request.group_id, user_id, session_id)
            .await?;
        if !joined {
            return Err(RpcStatus::new(
                RpcCode::Internal,
                "Failed to join matchmaker stream",
            )
            .into());
        }

        let presences = self
            .stream
            .stream_user_list(StreamMode::Matchmaking, &request.group_id)
            .await?;

        let mut response_presences = Vec::with_capacity(presences.len());
        for presence in presences {
            let parameters = if presence.status.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_str(&presence.status)?
            };
            response_presences.push(MatchmakingPresence {
                user_id: presence.user_id,
                session_id: presence.session_id,
                username: presence.username,
                parameters,
            });
        }

        Ok(MatchmakerStreamResponse {
            success: true,
            presences: response_presences,
        })
    }

    /// Aggregate stats and extracted tickets from the latest snapshot.
    pub fn matchmaker_state(&self) -> MatchmakerStateResponse {
        let snapshot = self.pipeline.latest_snapshot();

        match snapshot {
            Some(snapshot) => {
                let mut index: Vec<MatchmakerExtract> = Vec::new();
                for candidate in &snapshot.candidates {
                    for entry in candidate {
                        if let Some(extract) =
                            index.iter_mut().find(|x| x.ticket == entry.ticket)
                        {
                            if !extract.user_ids.contains(&entry.presence.user_id) {
                                extract.user_ids.push(entry.presence.user_id.clone());
                            }
                        } else {
                            index.push(MatchmakerExtract {
                                ticket: entry.ticket.clone(),
                                user_ids: vec![entry.presence.user_id.clone()],
                            });
                        }
                    }
                }

                MatchmakerStateResponse {
                    stats: MatchmakerStats {
                        candidate_count: snapshot.candidates.len(),
                        match_count: snapshot.selected.len(),
                        duplicate_count: snapshot.filter_counts.duplicate,
                        odd_size_count: snapshot.filter_counts.odd_size,
                        unreachable_count: snapshot.filter_counts.no_matching_servers,
                        completed_at: Some(snapshot.completed_at),
                    },
                    index,
                }
            }
            None => MatchmakerStateResponse::default(),
        }
    }

    /// Balance a caller-provided tuple and return the match label.
    pub fn build_match(&self, request: BuildMatchRequest) -> Result<BuildMatchResponse> {
        if request.entries.is_empty() {
            return Err(RpcStatus::new(RpcCode::InvalidArgument, "No entries provided").into());
        }

        let (team_a, team_b) = balance_by_ticket(&request.entries);
        let ratings_a: Vec<WengLinRating> = team_a.iter().map(|e| e.rating).collect();
        let ratings_b: Vec<WengLinRating> = team_b.iter().map(|e| e.rating).collect();
        let draw = predict_draw(
            &ratings_a,
            &ratings_b,
            &self.pipeline.config().rating_config,
        );

        let roster = |team: &[RatedEntry]| -> Vec<String> {
            team.iter().map(|e| e.entry.presence.user_id.clone()).collect()
        };

        let label = json!({
            "teams": [roster(&team_a), roster(&team_b)],
            "team_strengths": [rated_team_strength(&team_a), rated_team_strength(&team_b)],
            "draw": draw,
            "size": team_a.len() + team_b.len(),
        });

        Ok(BuildMatchResponse { label })
    }
}

/// Request to join the matchmaking presence stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakerStreamRequest {
    pub group_id: String,
}

/// A queued presence with its session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingPresence {
    pub user_id: String,
    pub session_id: String,
    pub username: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakerStreamResponse {
    pub success: bool,
    pub presences: Vec<MatchmakingPresence>,
}

/// Aggregate stats from the latest pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchmakerStats {
    pub candidate_count: usize,
    pub match_count: usize,
    pub duplicate_count: usize,
    pub odd_size_count: usize,
    pub unreachable_count: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One active ticket extracted from the latest candidate set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakerExtract {
    pub ticket: String,
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchmakerStateResponse {
    pub stats: MatchmakerStats,
    pub index: Vec<MatchmakerExtract>,
}

/// Request to balance a specific entry tuple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildMatchRequest {
    pub entries: Vec<TicketEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildMatchResponse {
    pub label: serde_json::Value,
}
