use crate::ui::binding::GraphQueryResponse;

// Events cross from tokio tasks into the egui loop over an mpsc channel;
// the app drains them at the top of each frame. `generation` ties stream
// events to the request that produced them so stale chunks can be dropped.
// Stream chunks stay raw bytes end to end: a chunk boundary can fall inside
// a multi-byte UTF-8 character, so decoding waits until the patch decoder
// has a complete line.
#[derive(Debug, Clone)]
pub enum AppEvent {
    StreamDelta { generation: u64, chunk: Vec<u8> },
    StreamEnd { generation: u64 },
    StreamError { generation: u64, message: String },
    GraphLoaded(GraphQueryResponse),
    GraphError(String),
}
