//! Serializable records crossing the core's boundary.
//!
//! | Record | Direction |
//! |--------|-----------|
//! | `ClassificationResult` | classifier → caller |
//! | `DetectionEvent` | caller → result sink (JSON POST body) |
//! | `ObjectCreatedNotification` | storage trigger → batch handler |

pub mod notification;
pub mod records;

pub use notification::{NotificationRecord, ObjectCreatedNotification, ObjectLocation, RawRecord};
pub use records::{ClassificationResult, DetectionEvent};
