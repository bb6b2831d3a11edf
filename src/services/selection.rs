use crate::error::AppError;

pub const MAX_SELECTED_SESSIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
}

/// Session names picked on the signup form, bounded at selection time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSelection {
    names: Vec<String>,
}

impl SessionSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a selection from a submitted list. Repeated names count once.
    pub fn from_names<I, S>(names: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selection = Self::new();
        for name in names {
            if !selection.contains(name.as_ref()) {
                selection.toggle(name.as_ref())?;
            }
        }
        Ok(selection)
    }

    /// Adds `name`, or removes it if already selected. Adding past the limit
    /// fails and leaves the selection as it was.
    pub fn toggle(&mut self, name: &str) -> Result<Toggle, AppError> {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            self.names.remove(pos);
            return Ok(Toggle::Removed);
        }
        if self.names.len() >= MAX_SELECTED_SESSIONS {
            return Err(AppError::Validation(format!(
                "You can select at most {} sessions",
                MAX_SELECTED_SESSIONS
            )));
        }
        self.names.push(name.to_string());
        Ok(Toggle::Added)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
