// File: livespot-common/src/models/mod.rs
pub mod credential;
pub mod event;
pub mod outreach;
pub mod profile;
pub mod trigger;

pub use credential::{AuthMethod, Credential};
pub use event::{
    ChatEvent, MessageKind, NormalizedMessage, NormalizedSession, NormalizedViewer, TipEvent, TipKind,
    ViewerEntry,
};
pub use outreach::{NewOutreachRecord, OutreachRecord, OutreachStatus, PlatformSession};
pub use profile::{RegisteredCast, SegmentMember, SessionTipTotal, SpyProfileRow, UserProfile};
pub use trigger::{
    ActionTaken, ActionType, Trigger, TriggerContext, TriggerLogEntry, TriggerType, DEFAULT_TRIGGER_PRIORITY,
};
