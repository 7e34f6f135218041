// Engine-level test modules
// Scenario tests exercise the public surface through fake API and channel
// implementations; unit tests live next to the modules they cover.

mod support;
mod typing_tests;
