use crate::model::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An application attached to a service instance. Bindings are the dependent
/// records removed by a cascading clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub binding_id: String,
    pub app_id: String,
    pub instance_id: Id,
    pub created_at: DateTime<Utc>,
}
