/// Substring rules that drop an error before it is tracked or shown.
#[derive(Clone, Debug, Default)]
pub struct SilenceFilters {
    endpoints: Vec<String>,
    messages: Vec<String>,
}

impl SilenceFilters {
    pub fn new(endpoints: Vec<String>, messages: Vec<String>) -> Self {
        Self {
            endpoints: endpoints.into_iter().filter(|s| !s.is_empty()).collect(),
            messages: messages.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    pub fn silences_endpoint(&self, url: &str) -> bool {
        self.endpoints.iter().any(|needle| url.contains(needle.as_str()))
    }

    /// `hide_all` is the admin switch; it wins over the substring list.
    pub fn silences_message(&self, message: &str, hide_all: bool) -> bool {
        hide_all
            || self
                .messages
                .iter()
                .any(|needle| message.contains(needle.as_str()))
    }
}
