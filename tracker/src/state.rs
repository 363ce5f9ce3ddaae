use crate::request::TrackerRequest;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct AppState {
    pub requests: mpsc::Sender<TrackerRequest>,
}
