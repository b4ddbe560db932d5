//! Status enums for the `status` TEXT columns.
//!
//! Rows keep the raw string so an unexpected value written by hand never
//! breaks decoding; these enums are the typed view used for transitions.

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// Return the value stored in the database.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $val ),+
                }
            }

            /// Parse a stored value.
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Transcription job status.
    JobStatus {
        Pending = "pending",
        Processing = "processing",
        Completed = "completed",
        Failed = "failed",
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub const ACTIVE: &'static [JobStatus] = &[Self::Pending, Self::Processing];
}

define_status_enum! {
    /// Render job status.
    RenderStatus {
        Queued = "queued",
        Processing = "processing",
        Completed = "completed",
        Failed = "failed",
        Cancelled = "cancelled",
    }
}

impl RenderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Statuses that count against the concurrency limit and may be cancelled.
    pub const ACTIVE: &'static [RenderStatus] = &[Self::Queued, Self::Processing];

    /// Statuses shown in render history.
    pub const FINISHED: &'static [RenderStatus] = &[Self::Completed, Self::Failed];
}

/// Stored strings for a status set, for `status = ANY($n)` binds.
pub fn status_strings<S: Copy + Into<&'static str>>(statuses: &[S]) -> Vec<&'static str> {
    statuses.iter().map(|s| (*s).into()).collect()
}

impl From<JobStatus> for &'static str {
    fn from(value: JobStatus) -> Self {
        value.as_str()
    }
}

impl From<RenderStatus> for &'static str {
    fn from(value: RenderStatus) -> Self {
        value.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::parse(status.as_str()), Some(*status));
        }
        for status in RenderStatus::ALL {
            assert_eq!(RenderStatus::parse(status.as_str()), Some(*status));
        }
    }

    #[test]
    fn unknown_value_does_not_parse() {
        assert_eq!(JobStatus::parse("cancelled"), None);
        assert_eq!(RenderStatus::parse("PROCESSING"), None);
    }

    #[test]
    fn terminal_sets() {
        let terminal: Vec<_> = RenderStatus::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![&RenderStatus::Completed, &RenderStatus::Failed, &RenderStatus::Cancelled]
        );
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RenderStatus::Cancelled).unwrap(), "\"cancelled\"");
    }

    #[test]
    fn status_strings_for_binds() {
        assert_eq!(status_strings(RenderStatus::ACTIVE), vec!["queued", "processing"]);
    }
}
