/// Uninhabited return type for loops that only end in an error, such as
/// [`Controller::run`](crate::Controller::run). Stands in for the unstable `!`.
#[derive(Debug)]
pub enum Never {}
