/// Captures the raw request/response bytes for one upstream call so they can
/// be attached to `GenerateResult` for debugging. One instance per call; it
/// is never shared across calls or cloned into a shared buffer — capture
/// must never leak bytes from one tenant's call into another's result.
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    request: Option<Vec<u8>>,
    response: Option<Vec<u8>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&mut self, body: &[u8]) {
        self.request = Some(body.to_vec());
    }

    pub fn record_response(&mut self, body: &[u8]) {
        self.response = Some(body.to_vec());
    }

    pub fn into_parts(self) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
        (self.request, self.response)
    }
}
