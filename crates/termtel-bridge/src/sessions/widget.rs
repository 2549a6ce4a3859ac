/// Last two values a widget was given, so redraws happen only on change.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetState<T> {
    current: Option<T>,
    previous: Option<T>,
}

impl<T> Default for WidgetState<T> {
    fn default() -> Self {
        Self {
            current: None,
            previous: None,
        }
    }
}

impl<T: PartialEq> WidgetState<T> {
    /// Store `value`; returns true when it differs from the previous one.
    pub fn update(&mut self, value: T) -> bool {
        self.previous = self.current.take();
        self.current = Some(value);
        self.has_changed()
    }

    pub fn has_changed(&self) -> bool {
        self.current != self.previous
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }
}
