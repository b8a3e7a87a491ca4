#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Ask the backend to constrain output to valid JSON.
    pub json_format: bool,
    pub temperature: Option<f64>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            json_format: false,
            temperature: None,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_format = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}
