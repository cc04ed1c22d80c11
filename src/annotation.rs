use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

/// 1つの音声サンプルに対するアノテーション
///
/// 音声ファイルのメタデータと人手による文字起こしテキストを保持する。
/// TSV サイドカーファイルの1行に対応し、フィールドの宣言順が
/// そのまま TSV の列順になる。
///
/// # Examples
///
/// ```
/// # use voice_annotation_tool::annotation::Annotation;
/// let annotation = Annotation::new("sample.mp3");
/// assert_eq!(annotation.file_name(), "sample.mp3");
/// assert!(annotation.sentence.is_empty());
/// assert!(!annotation.modified);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Annotation {
    /// 録音者の識別子
    #[serde(default)]
    pub client_id: String,

    /// 音声ファイルのパス
    ///
    /// TSV 上では音声フォルダからの相対パスで保存され、
    /// プロジェクトへの追加時に絶対パスへ解決される。
    #[serde(default)]
    pub path: PathBuf,

    /// 文字起こしテキスト。未転写の場合は空文字列
    #[serde(default)]
    pub sentence: String,

    /// 賛成票の数
    #[serde(default, deserialize_with = "votes_or_zero")]
    pub up_votes: u32,

    /// 反対票の数
    #[serde(default, deserialize_with = "votes_or_zero")]
    pub down_votes: u32,

    /// 録音者の年齢層
    #[serde(default)]
    pub age: String,

    /// 録音者の性別
    #[serde(default)]
    pub gender: String,

    /// 録音者のアクセント
    #[serde(default)]
    pub accent: String,

    /// 前回の保存以降に文字起こしが編集されたかどうか
    ///
    /// TSV には書き出されない。プロジェクト記述子の
    /// `modified_annotations` リストから復元される。
    #[serde(skip)]
    pub modified: bool,
}

impl Annotation {
    /// TSV のヘッダ行。列順は固定
    pub const TSV_HEADER: [&'static str; 8] = [
        "client_id",
        "path",
        "sentence",
        "up_votes",
        "down_votes",
        "age",
        "gender",
        "accent",
    ];

    /// 空のアノテーションを作成する
    ///
    /// 音声フォルダの走査で未知のファイルを検出したときに使う。
    /// メタデータはすべてゼロ値になる。
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// 音声ファイルのベース名
    ///
    /// プロジェクト内でアノテーションを引くための結合キー。
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// TSV の1行分のフィールドを列順で返す
    ///
    /// `path` はベース名として書き出される。`modified` は含まれない。
    pub fn to_record(&self) -> [String; 8] {
        [
            self.client_id.clone(),
            self.file_name(),
            self.sentence.clone(),
            self.up_votes.to_string(),
            self.down_votes.to_string(),
            self.age.clone(),
            self.gender.clone(),
            self.accent.clone(),
        ]
    }
}

/// 票数のセルをパースする。空セルは 0 として扱う
fn votes_or_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse().map_err(serde::de::Error::custom)
}
