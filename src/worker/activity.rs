/// Activity signals of one worker.
///
/// `liveness` follows heartbeats and expires after the grace window;
/// `control` follows explicit activate/deactivate calls. Either one keeps the
/// worker running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Activity {
    pub liveness: bool,
    pub control: bool,
}

impl Activity {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.liveness || self.control
    }
}
