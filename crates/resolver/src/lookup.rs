use invsync_core::RemoteId;
use invsync_records::Reference;

use crate::error::LookupError;

/// Read-only existence check for references that no local record satisfies.
pub trait ExternalLookup {
    fn find(&self, reference: &Reference) -> Result<Option<RemoteId>, LookupError>;
}

impl<F> ExternalLookup for F
where
    F: Fn(&Reference) -> Result<Option<RemoteId>, LookupError>,
{
    fn find(&self, reference: &Reference) -> Result<Option<RemoteId>, LookupError> {
        self(reference)
    }
}
