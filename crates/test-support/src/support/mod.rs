pub mod fake_library;
