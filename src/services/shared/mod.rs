// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Plumbing shared by HTTP backend clients.

pub mod sse;
