/// Data layer: container decoding and core types.
///
/// Architecture:
/// ```text
///  path + bytes
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  route by extension
///   └──────────┘
///     │      │
///     ▼      ▼
///  ┌─────┐ ┌──────┐
///  │ mat │ │ fits │  → DecodedDataset / FitsTable
///  └─────┘ └──────┘
///        │
///        ▼
///   ┌──────────┐
///   │ filename  │  recording kind from the file name (MAT only)
///   └──────────┘
/// ```

pub mod filename;
pub mod fits;
pub mod loader;
pub mod mat;
pub mod model;
pub mod synth;
