use std::future::Future;
use std::pin::Pin;

use gpui::SharedString;

/// Values a field can hold.
///
/// `same_content` decides dirtiness against the field's baseline. Text values
/// ignore surrounding whitespace.
pub trait FieldValue: Clone + PartialEq + Send + Sync + 'static {
    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

impl FieldValue for String {
    fn same_content(&self, other: &Self) -> bool {
        self.trim() == other.trim()
    }
}

impl FieldValue for SharedString {
    fn same_content(&self, other: &Self) -> bool {
        self.trim() == other.trim()
    }
}

macro_rules! plain_field_value {
    ($($ty:ty),* $(,)?) => {
        $(impl FieldValue for $ty {})*
    };
}

plain_field_value!(bool, char, i32, i64, u32, u64, usize, f32, f64);

impl<T: FieldValue> FieldValue for Option<T> {
    fn same_content(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(left), Some(right)) => left.same_content(right),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn same_content(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(left, right)| left.same_content(right))
    }
}

/// A synchronous rule. `None` means the value passes.
pub trait FieldValidator<T>: Send + Sync {
    fn validate(&self, value: &T) -> Option<SharedString>;
}

impl<T, F> FieldValidator<T> for F
where
    F: Fn(&T) -> Option<SharedString> + Send + Sync,
{
    fn validate(&self, value: &T) -> Option<SharedString> {
        (self)(value)
    }
}

pub type BoxedValidationFuture = Pin<Box<dyn Future<Output = Option<SharedString>> + Send>>;

/// A rule that needs to wait, for example on a server lookup.
pub trait AsyncFieldValidator<T>: Send + Sync {
    fn validate(&self, value: T) -> BoxedValidationFuture;
}

impl<T, F> AsyncFieldValidator<T> for F
where
    F: Fn(T) -> BoxedValidationFuture + Send + Sync,
{
    fn validate(&self, value: T) -> BoxedValidationFuture {
        (self)(value)
    }
}

pub mod validators {
    use gpui::SharedString;

    pub fn required<T>(
        message: impl Into<SharedString>,
    ) -> impl Fn(&T) -> Option<SharedString> + Send + Sync + Clone
    where
        T: AsRef<str>,
    {
        let message = message.into();
        move |value: &T| value.as_ref().trim().is_empty().then(|| message.clone())
    }

    pub fn min_length<T>(
        min: usize,
        message: impl Into<SharedString>,
    ) -> impl Fn(&T) -> Option<SharedString> + Send + Sync + Clone
    where
        T: AsRef<str>,
    {
        let message = message.into();
        move |value: &T| (value.as_ref().chars().count() < min).then(|| message.clone())
    }

    pub fn max_length<T>(
        max: usize,
        message: impl Into<SharedString>,
    ) -> impl Fn(&T) -> Option<SharedString> + Send + Sync + Clone
    where
        T: AsRef<str>,
    {
        let message = message.into();
        move |value: &T| (value.as_ref().chars().count() > max).then(|| message.clone())
    }

    pub fn predicate<T, P>(
        predicate: P,
        message: impl Into<SharedString>,
    ) -> impl Fn(&T) -> Option<SharedString> + Send + Sync + Clone
    where
        P: Fn(&T) -> bool + Send + Sync + Clone,
    {
        let message = message.into();
        move |value: &T| (!predicate(value)).then(|| message.clone())
    }
}
