//! Expiring download links for delivered exports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evtag_core::{ExportRequestId, LinkId, OrganizationId};

use crate::error::LinkError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub organization: OrganizationId,
    pub request: ExportRequestId,
    pub url: String,
    pub is_enabled: bool,
    pub expiration_date: DateTime<Utc>,
    /// Zone the expiry is shown in, inherited from the export request.
    pub time_zone: String,
    pub created_at: DateTime<Utc>,
}

impl Link {
    /// The download URL, if the link may still be followed at `now`.
    pub fn access(&self, now: DateTime<Utc>) -> Result<&str, LinkError> {
        if !self.is_enabled {
            return Err(LinkError::Disabled(self.id));
        }
        if now >= self.expiration_date {
            return Err(LinkError::Expired {
                id: self.id,
                expired_at: self.expiration_date,
            });
        }
        Ok(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn link(now: DateTime<Utc>) -> Link {
        Link {
            id: LinkId::new(),
            organization: OrganizationId::new(),
            request: ExportRequestId::new(),
            url: "https://files.example.com/a.zip".into(),
            is_enabled: true,
            expiration_date: now + Duration::hours(1),
            time_zone: "UTC".into(),
            created_at: now,
        }
    }

    #[test]
    fn valid_until_expiration() {
        let now = Utc::now();
        let l = link(now);
        assert_eq!(l.access(now).unwrap(), "https://files.example.com/a.zip");
        assert!(matches!(
            l.access(now + Duration::hours(1)),
            Err(LinkError::Expired { .. })
        ));
    }

    #[test]
    fn disabled_link_is_refused_immediately() {
        let now = Utc::now();
        let mut l = link(now);
        l.is_enabled = false;
        assert_eq!(l.access(now), Err(LinkError::Disabled(l.id)));
    }
}
