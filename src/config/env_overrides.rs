use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("GENRELAY_BACKEND")
            && !backend.trim().is_empty()
        {
            self.default_backend = Some(backend.trim().to_ascii_lowercase());
        }

        if let Ok(temp_str) = std::env::var("GENRELAY_TEMPERATURE")
            && let Ok(temp) = temp_str.parse::<f64>()
            && (0.0..=2.0).contains(&temp)
        {
            self.generation.temperature = temp;
        }

        if let Ok(tokens_str) = std::env::var("GENRELAY_MAX_TOKENS")
            && let Ok(tokens) = tokens_str.parse::<u32>()
            && tokens > 0
        {
            self.generation.max_tokens = tokens;
        }

        if let Ok(attempts_str) = std::env::var("GENRELAY_MAX_ATTEMPTS")
            && let Ok(attempts) = attempts_str.parse::<u32>()
            && attempts > 0
        {
            self.reliability.max_attempts = attempts;
        }

        if let Ok(backoff_str) = std::env::var("GENRELAY_BASE_BACKOFF_MS")
            && let Ok(backoff) = backoff_str.parse::<u64>()
        {
            self.reliability.base_backoff_ms = backoff;
            self.reliability.max_backoff_ms = self.reliability.max_backoff_ms.max(backoff);
        }
    }
}
