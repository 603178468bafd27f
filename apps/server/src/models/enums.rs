//! Status enums shared by participants, summaries, sites and measurements
//!
//! Each enum has one upper-case text form, used both in JSON and in the database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        /// Case-insensitive parse of the text form
        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "Invalid {} value '{}'",
                        stringify!($name),
                        other
                    )),
                }
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a physical measurements record; `Unset` on new and restored records
    PhysicalMeasurementsStatus {
        Unset => "UNSET",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
);

text_enum!(
    WithdrawalStatus {
        NotWithdrawn => "NOT_WITHDRAWN",
        NoUse => "NO_USE",
    }
);

text_enum!(
    EnrollmentStatus {
        Interested => "INTERESTED",
        Member => "MEMBER",
        FullParticipant => "FULL_PARTICIPANT",
    }
);

text_enum!(
    OrganizationType {
        Unset => "UNSET",
        Hpo => "HPO",
        Fqhc => "FQHC",
        Dv => "DV",
        Va => "VA",
    }
);

text_enum!(
    SiteStatus {
        Active => "ACTIVE",
        Inactive => "INACTIVE",
    }
);

text_enum!(
    QuestionnaireStatus {
        Unset => "UNSET",
        Submitted => "SUBMITTED",
    }
);

text_enum!(
    SampleStatus {
        Unset => "UNSET",
        Received => "RECEIVED",
    }
);

impl Default for WithdrawalStatus {
    fn default() -> Self {
        WithdrawalStatus::NotWithdrawn
    }
}

impl Default for EnrollmentStatus {
    fn default() -> Self {
        EnrollmentStatus::Interested
    }
}

impl Default for QuestionnaireStatus {
    fn default() -> Self {
        QuestionnaireStatus::Unset
    }
}

impl Default for SampleStatus {
    fn default() -> Self {
        SampleStatus::Unset
    }
}

/// Parse an optional text column read from storage
pub(crate) fn parse_column<T: FromStr<Err = String>>(value: Option<String>) -> crate::Result<Option<T>> {
    value
        .map(|v| v.parse::<T>().map_err(crate::Error::Internal))
        .transpose()
}
