//! Event types for the UDX event system
//!
//! Provides shared event definitions and the EventBus used by UDX services.
//! Events are broadcast via EventBus and can be serialized for SSE
//! transmission; all events use this central enum for type safety and
//! exhaustive matching.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// UDX document-pipeline event types
///
/// Doc types, tiers, bands, and routes are carried as their serialized string
/// forms so that this crate stays independent of the service-side enums.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DocEvent {
    /// Classification pipeline started for a document
    ///
    /// Triggers:
    /// - SSE: Show per-document progress in the intake view
    ClassificationStarted {
        /// Document UUID entering the pipeline
        document_id: Uuid,
        /// Original filename (for display)
        filename: String,
        /// When classification started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Classification pipeline produced a final result
    ///
    /// Triggers:
    /// - SSE: Update document row with type/confidence
    /// - Audit: Append to classification history
    ClassificationCompleted {
        /// Document UUID
        document_id: Uuid,
        /// Final document type (serialized form, e.g. "IRS_PERSONAL")
        doc_type: String,
        /// Calibrated confidence (0.35-0.97)
        confidence: f64,
        /// Confidence band ("HIGH" | "MEDIUM" | "LOW")
        band: String,
        /// Pipeline tier that produced the result
        tier: String,
        /// Resolved tax year, if any
        tax_year: Option<i32>,
        /// When classification completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Classification pipeline fell back after an internal error
    ///
    /// The pipeline never surfaces errors to callers; this event is the
    /// observable trace of a swallowed failure.
    ClassificationFailed {
        /// Document UUID
        document_id: Uuid,
        /// Why the pipeline fell back
        reason: String,
        /// When the failure occurred
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Gatekeeper classified and routed a document
    ///
    /// Triggers:
    /// - SSE: Update routing column in the deal view
    /// - Audit: Append to routing history
    GatekeeperClassified {
        /// Document UUID
        document_id: Uuid,
        /// Coarse document type (serialized form, e.g. "PERSONAL_TAX_RETURN")
        doc_type: String,
        /// Model-reported confidence (0.0-1.0)
        confidence: f64,
        /// Extraction route ("STANDARD" | "GOOGLE_DOC_AI_CORE" | "NEEDS_REVIEW")
        route: String,
        /// Whether the document requires human review
        needs_review: bool,
        /// Whether the classification came from the tenant cache
        cache_hit: bool,
        /// When the gatekeeper decision was made
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Per-deal batch classification finished
    ///
    /// Triggers:
    /// - SSE: Refresh the deal document list
    BatchClassificationCompleted {
        /// Deal UUID
        deal_id: Uuid,
        /// Documents considered in this batch
        total: usize,
        /// Documents classified successfully
        classified: usize,
        /// Documents routed to human review
        needs_review: usize,
        /// Batch duration in milliseconds
        duration_ms: u64,
        /// When the batch completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A human confirmed a document's classification
    ///
    /// Triggers:
    /// - SSE: Lock the type display for this document
    /// - Readiness: Effective type now resolves as CONFIRMED
    DocumentConfirmed {
        /// Document UUID
        document_id: Uuid,
        /// Confirmed document type (serialized form)
        doc_type: String,
        /// Confirmed tax year, if supplied
        tax_year: Option<i32>,
        /// When confirmation was recorded
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Readiness was evaluated for a deal
    ///
    /// Triggers:
    /// - SSE: Update the completeness meter
    ReadinessEvaluated {
        /// Deal UUID
        deal_id: Uuid,
        /// Percentage of required facts satisfied (0.0-100.0)
        readiness_pct: f64,
        /// Whether the deal is ready to proceed
        ready: bool,
        /// Count of unsatisfied requirements
        missing_count: usize,
        /// Count of documents awaiting human review
        needs_review_count: usize,
        /// When readiness was evaluated
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl DocEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            DocEvent::ClassificationStarted { .. } => "ClassificationStarted",
            DocEvent::ClassificationCompleted { .. } => "ClassificationCompleted",
            DocEvent::ClassificationFailed { .. } => "ClassificationFailed",
            DocEvent::GatekeeperClassified { .. } => "GatekeeperClassified",
            DocEvent::BatchClassificationCompleted { .. } => "BatchClassificationCompleted",
            DocEvent::DocumentConfirmed { .. } => "DocumentConfirmed",
            DocEvent::ReadinessEvaluated { .. } => "ReadinessEvaluated",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for application-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use udx_common::events::{EventBus, DocEvent};
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// let event_bus = Arc::new(EventBus::new(100));
///
/// // Subscribe to events
/// let mut rx = event_bus.subscribe();
///
/// // Emit an event
/// event_bus.emit(DocEvent::ClassificationStarted {
///     document_id: Uuid::new_v4(),
///     filename: "2023_form_1040.pdf".to_string(),
///     timestamp: chrono::Utc::now(),
/// }).ok();
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DocEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events.
    ///   Production services use 100-1000; tests use 10-100.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DocEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: DocEvent) -> Result<usize, broadcast::error::SendError<DocEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Used for audit events where it is acceptable if no component is
    /// currently listening; the emitter logs locally and continues.
    pub fn emit_lossy(&self, event: DocEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    ///
    /// Useful for debugging and monitoring
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_completed_event() -> DocEvent {
        DocEvent::ClassificationCompleted {
            document_id: Uuid::new_v4(),
            doc_type: "IRS_PERSONAL".to_string(),
            confidence: 0.92,
            band: "HIGH".to_string(),
            tier: "tier1_anchor".to_string(),
            tax_year: Some(2023),
            timestamp: chrono::Utc::now(),
        }
    }

    /// **[EVENTBUS-TEST-010]** EventBus::new() creates bus with correct capacity
    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    /// **[EVENTBUS-TEST-020]** EventBus::subscribe() creates working receiver
    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(10);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    /// **[EVENTBUS-TEST-030]** EventBus::emit() delivers events to subscribers
    #[test]
    fn test_eventbus_emit() {
        use std::sync::Arc;
        let bus = Arc::new(EventBus::new(10));
        let mut rx = bus.subscribe();

        bus.emit(sample_completed_event()).expect("emit should succeed");

        let received = rx.try_recv().expect("Should receive event");
        assert_eq!(received.event_type(), "ClassificationCompleted");
    }

    /// **[EVENTBUS-TEST-040]** EventBus::emit_lossy() does not panic on full channel
    #[test]
    fn test_eventbus_emit_lossy() {
        let bus = EventBus::new(2); // Small capacity
        let mut _rx = bus.subscribe(); // Subscribe but don't receive

        // Overfill the channel
        for _ in 0..10 {
            bus.emit_lossy(sample_completed_event());
        }

        assert_eq!(bus.capacity(), 2);
    }

    /// **[EVENTBUS-TEST-050]** Multiple subscribers receive the same event
    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(sample_completed_event()).expect("emit should succeed");

        assert_eq!(
            rx1.try_recv().expect("rx1 should receive").event_type(),
            "ClassificationCompleted"
        );
        assert_eq!(
            rx2.try_recv().expect("rx2 should receive").event_type(),
            "ClassificationCompleted"
        );
    }

    /// Events serialize with a "type" tag for SSE transmission
    #[test]
    fn test_event_serialization_tagged() {
        let event = DocEvent::GatekeeperClassified {
            document_id: Uuid::new_v4(),
            doc_type: "BUSINESS_TAX_RETURN".to_string(),
            confidence: 0.87,
            route: "GOOGLE_DOC_AI_CORE".to_string(),
            needs_review: false,
            cache_hit: true,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).expect("serialization should succeed");
        assert!(json.contains("\"type\":\"GatekeeperClassified\""));
        assert!(json.contains("\"route\":\"GOOGLE_DOC_AI_CORE\""));

        let back: DocEvent = serde_json::from_str(&json).expect("deserialization should succeed");
        match back {
            DocEvent::GatekeeperClassified { cache_hit, .. } => assert!(cache_hit),
            _ => panic!("Wrong event type deserialized"),
        }
    }

    /// event_type() matches variant names for all events
    #[test]
    fn test_event_type_method() {
        let events = vec![
            (
                DocEvent::ClassificationStarted {
                    document_id: Uuid::new_v4(),
                    filename: "rent_roll.xlsx".to_string(),
                    timestamp: chrono::Utc::now(),
                },
                "ClassificationStarted",
            ),
            (
                DocEvent::ClassificationFailed {
                    document_id: Uuid::new_v4(),
                    reason: "normalization panicked".to_string(),
                    timestamp: chrono::Utc::now(),
                },
                "ClassificationFailed",
            ),
            (
                DocEvent::ReadinessEvaluated {
                    deal_id: Uuid::new_v4(),
                    readiness_pct: 66.7,
                    ready: false,
                    missing_count: 2,
                    needs_review_count: 1,
                    timestamp: chrono::Utc::now(),
                },
                "ReadinessEvaluated",
            ),
        ];

        for (event, expected_type) in events {
            assert_eq!(event.event_type(), expected_type);
        }
    }
}
