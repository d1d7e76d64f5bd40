//! Service layer: pipeline orchestration and the thin RPC surface

pub mod rpc;

pub use rpc::{
    BuildMatchRequest, BuildMatchResponse, MatchmakerExtract, MatchmakerService,
    MatchmakerStateResponse, MatchmakerStats, MatchmakerStreamRequest, MatchmakerStreamResponse,
    MatchmakingPresence,
};
