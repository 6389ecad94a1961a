/// A value that notifies subscribers when it changes.
///
/// Subscribers return `false` to be dropped, which lets a derived value
/// subscribe with a weak handle and disappear on its own once it is gone.
pub struct Observable<T> {
    value: T,
    subscribers: Vec<Box<dyn FnMut(&T) -> bool>>,
}

impl<T: PartialEq> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            subscribers: Vec::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Stores `value` and notifies subscribers. Returns whether it changed;
    /// setting an equal value is a no-op.
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        let current = &self.value;
        self.subscribers.retain_mut(|notify| notify(current));
        true
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&T) -> bool + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.value)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
