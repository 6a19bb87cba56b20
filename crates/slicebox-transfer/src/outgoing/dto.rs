//! Wire shape for the POLL-mode surface (spec.md §6: `GET /outgoing/poll`,
//! `POST /outgoing/done`).

use serde::{Deserialize, Serialize};
use slicebox_core::ids::{ImageId, OutgoingTransactionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingTransactionImage {
    pub transaction_id: OutgoingTransactionId,
    pub image_id: ImageId,
    pub sequence_number: i32,
    pub total_image_count: i32,
}
