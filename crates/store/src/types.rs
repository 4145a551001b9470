/// One stored association: a key mapped to a (value, context) pair.
///
/// All three fields are length-validated at insert time; none exceeds
/// 120 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Association {
    pub key: String,
    pub value: String,
    pub context: String,
}

impl Association {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            context: context.into(),
        }
    }
}
