/// Builds a `Vec<String>` out of anything that implements `ToString`.
#[macro_export]
macro_rules! vec_of_strings {
    ($($x:expr),* $(,)?) => {
        vec![$($x.to_string()),*]
    };
}
