// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod locate_tests;
mod sync_tests;
