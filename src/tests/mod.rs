// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod atomic_tests;
pub mod partition_tests;
