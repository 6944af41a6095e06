use std::collections::HashMap;
use std::time::Duration;

/// Normalized HTTP response handed to the crawler and detector.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_covers_2xx_only() {
        let resp = |status| HttpResponse {
            status,
            headers: HashMap::new(),
            body: String::new(),
            elapsed: Duration::ZERO,
        };
        assert!(resp(200).is_success());
        assert!(resp(204).is_success());
        assert!(!resp(301).is_success());
        assert!(!resp(404).is_success());
        assert!(!resp(500).is_success());
    }
}
