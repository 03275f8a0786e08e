// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Properties of planning and materialization that must hold for every
//! acyclic declaration graph.

mod plan_order;
