/// Integration tests for the event pipeline covering fan-in delivery,
/// rotation at period boundaries, archival and fatal failure handling.

mod delivery;
mod failures;
mod helpers;
mod rotation;
