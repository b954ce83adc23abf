pub(crate) mod comparator;
pub(crate) mod grading;
