//! voice-annotation-tool - 音声アノテーションプロジェクト管理
//!
//! このクレートは、音声サンプルのフォルダと人手による文字起こしテキストを
//! 対にした「音声アノテーションプロジェクト」を管理します。プロジェクトは
//! 小さな JSON 記述子と、サンプル毎のメタデータを保持するタブ区切り (TSV)
//! サイドカーファイルとして永続化されます。
//!
//! # 主な機能
//!
//! - **音声フォルダ同期**: フォルダ内の音声ファイルを検出して未知のサンプルにアノテーションを生成
//! - **TSV サイドカー**: サンプル毎のメタデータと文字起こしを固定列順で保存
//! - **JSON 記述子**: 音声フォルダ / TSV への相対パスと変更済みリストを記録
//! - **変更トラッキング**: 編集済みアノテーションを再起動を跨いで保持
//! - **CSV / JSON 交換**: 外部ツールとの文字起こし一括交換
//!
//! # アーキテクチャ
//!
//! ```text
//! [JSON 記述子] ──→ [Project] ←── [音声フォルダ走査]
//!                      ↓↑
//!               [AnnotationStore]
//!                      ↓↑
//!        ┌─────────────┼─────────────┐
//!        │             │             │
//! [TSV サイドカー]  [CSV 交換]   [JSON 交換]
//! ```
//!
//! # 使用例
//!
//! ```no_run
//! use std::fs::File;
//! use std::path::Path;
//! use voice_annotation_tool::project::Project;
//!
//! // プロジェクトを開く: 記述子 → TSV → 音声フォルダの順
//! let mut project = Project::new();
//! let file = File::open("project.json").unwrap();
//! project.load_json(file, Path::new(".")).unwrap();
//! if let Some(tsv_file) = project.tsv_file.clone() {
//!     project.load_tsv_file(File::open(tsv_file).unwrap()).unwrap();
//! }
//! if let Some(folder) = project.audio_folder.clone() {
//!     project.load_audio_files(&folder).unwrap();
//! }
//! ```

pub mod annotation;
pub mod interchange;
pub mod paths;
pub mod project;
pub mod store;
