pub mod documentation;
pub mod exercise_service;
pub mod health_service;
pub mod inject_service;
pub mod participant_service;
pub mod realtime_events;
pub mod scoring_service;
pub mod storage_supervisor;
#[cfg(test)]
pub(crate) mod test_support;
pub mod websocket_service;
