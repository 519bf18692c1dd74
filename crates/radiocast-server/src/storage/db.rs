//! Database connection and initialization.

radiocast_core::define_database!(Database, "Database migrations complete");
