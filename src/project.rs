use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;
use crate::paths;
use crate::store::AnnotationStore;

/// 認識する音声ファイルの拡張子（大文字小文字は区別する）
const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "ogg", "mp4", "webm", "avi", "mkv", "wav"];

/// プロジェクト記述子 (JSON)
///
/// 3つのキーはすべて必須。パスは記述子ファイル自身の場所からの
/// 相対パスで保存され、未設定の場合は空文字列になる。
#[derive(Debug, Deserialize, Serialize)]
struct Descriptor {
    tsv_file: String,
    audio_folder: String,
    modified_annotations: Vec<String>,
}

/// 音声アノテーションプロジェクト
///
/// 1つのプロジェクトの全アノテーションを所有する集約。JSON 記述子と
/// TSV サイドカーの読み書き、音声フォルダとの同期、変更トラッキングを
/// 担当する。ファイルハンドルは呼び出し毎にスコープされ、メソッド
/// 呼び出しを跨いで保持されることはない。
///
/// プロジェクトを開く手順は呼び出し側が順序付ける:
/// `load_json` → `load_tsv_file` → `load_audio_files`。
#[derive(Debug, Default)]
pub struct Project {
    /// TSV サイドカーファイルのパス。未設定の場合は `None`
    pub tsv_file: Option<PathBuf>,

    /// 音声サンプルを含むフォルダ。未設定の場合は `None`
    pub audio_folder: Option<PathBuf>,

    /// ファイル名をキーとする挿入順のアノテーション索引
    annotations: AnnotationStore,

    /// 変更済みアノテーションのファイル名リスト
    ///
    /// `Annotation::modified` フラグの永続化表現。記述子に保存され、
    /// 読み込み時にフラグへ復元される。重複は持たない。
    modified_annotations: Vec<String>,
}

impl Project {
    /// 空のプロジェクトを作成する
    ///
    /// 新規プロジェクトの場合は呼び出し側が `audio_folder` と
    /// `tsv_file` を直接設定する。
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON 記述子からプロジェクトを読み込む
    ///
    /// `tsv_file` と `audio_folder` は `location` からの相対パスとして
    /// 解決される。TSV の内容や音声フォルダはここでは読み込まない。
    ///
    /// # Errors
    ///
    /// 記述子のパースに失敗した場合、または必須キーが欠けている場合に
    /// エラーを返す。失敗時はプロジェクトの状態は変化しない。
    pub fn load_json<R: Read>(&mut self, reader: R, location: &Path) -> Result<()> {
        let descriptor: Descriptor =
            serde_json::from_reader(reader).context("プロジェクト記述子のパースに失敗")?;
        self.tsv_file = paths::resolve(location, &descriptor.tsv_file);
        self.audio_folder = paths::resolve(location, &descriptor.audio_folder);
        self.modified_annotations = descriptor.modified_annotations;
        Ok(())
    }

    /// プロジェクトを JSON 記述子として書き出す
    ///
    /// パスは `location`（記述子ファイルの場所）からの相対パスで
    /// 保存される。未設定のパスは空文字列になる。
    pub fn save<W: Write>(&self, writer: W, location: &Path) -> Result<()> {
        let descriptor = Descriptor {
            tsv_file: relative_string(self.tsv_file.as_deref(), location),
            audio_folder: relative_string(self.audio_folder.as_deref(), location),
            modified_annotations: self.modified_annotations.clone(),
        };
        serde_json::to_writer(writer, &descriptor).context("プロジェクト記述子の書き込みに失敗")?;
        Ok(())
    }

    /// 音声フォルダからサンプルを検出してアノテーションを追加する
    ///
    /// `folder` が存在しない場合はアノテーション集合に手を付けずに
    /// 正常終了する（呼び出し側が検知して利用者に知らせる）。
    /// 検出順はファイルシステムの列挙順のまま。既に索引にある
    /// ファイル名は追加しない。
    pub fn load_audio_files(&mut self, folder: &Path) -> Result<()> {
        self.audio_folder = Some(folder.to_path_buf());
        if !folder.is_dir() {
            log::warn!("音声フォルダが見つかりません: {:?}", folder);
            return Ok(());
        }

        let entries = fs::read_dir(folder)
            .with_context(|| format!("音声フォルダの読み込みに失敗: {:?}", folder))?;
        let mut discovered = 0usize;
        for entry in entries {
            let entry =
                entry.with_context(|| format!("音声フォルダの読み込みに失敗: {:?}", folder))?;
            let path = PathBuf::from(entry.file_name());
            if !is_audio_file(&path) {
                continue;
            }
            let file_name = path.to_string_lossy().into_owned();
            if self.annotations.contains(&file_name) {
                continue;
            }
            self.add_annotation(Annotation::new(path));
            discovered += 1;
        }
        log::info!("音声フォルダから {} 件のサンプルを検出しました", discovered);
        Ok(())
    }

    /// TSV サイドカーからアノテーションを読み込む
    ///
    /// 各行のパスは `add_annotation` で音声フォルダに対して解決される。
    /// ファイル名が `modified_annotations` にあれば `modified` フラグを
    /// 復元する。ディスク上にファイルが存在するかどうかは確認しない。
    pub fn load_tsv_file<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut tsv = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(reader);
        let mut loaded = 0usize;
        for row in tsv.deserialize() {
            let mut annotation: Annotation = row.context("TSV 行のパースに失敗")?;
            if self
                .modified_annotations
                .iter()
                .any(|name| *name == annotation.file_name())
            {
                annotation.modified = true;
            }
            self.add_annotation(annotation);
            loaded += 1;
        }
        log::info!("TSV から {} 件のアノテーションを読み込みました", loaded);
        Ok(())
    }

    /// アノテーションの全メタデータを TSV サイドカーに書き出す
    ///
    /// 固定のヘッダ行に続けて、挿入順で1行ずつタブ区切りで書く。
    /// 行末は CRLF。`modified` フラグは書き出されない。
    pub fn save_annotations<W: Write>(&self, writer: W) -> Result<()> {
        let mut tsv = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::CRLF)
            .from_writer(writer);
        tsv.write_record(Annotation::TSV_HEADER)
            .context("TSV ヘッダの書き込みに失敗")?;
        for annotation in self.annotations.iter() {
            tsv.write_record(annotation.to_record())
                .with_context(|| format!("TSV 行の書き込みに失敗: {}", annotation.file_name()))?;
        }
        tsv.flush().context("TSV の書き出しに失敗")?;
        Ok(())
    }

    /// アノテーションを追加する
    ///
    /// 音声フォルダが設定されていればパスをそれに対して解決する
    /// （絶対パスはそのまま通る）。同じファイル名は後勝ちで
    /// 置き換えられ、順序の枠は増えない。
    pub fn add_annotation(&mut self, mut annotation: Annotation) {
        if let Some(folder) = &self.audio_folder {
            annotation.path = folder.join(&annotation.path);
        }
        self.annotations.insert(annotation.file_name(), annotation);
    }

    /// アノテーションの文字起こしテキストを変更する
    ///
    /// `modified` フラグを立て、ファイル名を `modified_annotations` に
    /// 高々1回だけ追加する。未知のファイル名の場合は何も変更せず
    /// `false` を返す。
    pub fn annotate(&mut self, file_name: &str, text: &str) -> bool {
        let annotation = match self.annotations.get_mut(file_name) {
            Some(annotation) => annotation,
            None => return false,
        };
        if !annotation.modified {
            annotation.modified = true;
            if !self.modified_annotations.iter().any(|name| name == file_name) {
                self.modified_annotations.push(file_name.to_owned());
            }
        }
        annotation.sentence = text.to_owned();
        true
    }

    /// アノテーションを確認済みにする
    ///
    /// `modified` フラグを下ろし、ファイル名を `modified_annotations`
    /// から取り除く。既にクリーンな場合は何もしない。
    pub fn mark_unchanged(&mut self, file_name: &str) {
        if let Some(annotation) = self.annotations.get_mut(file_name) {
            annotation.modified = false;
        }
        self.modified_annotations.retain(|name| name != file_name);
    }

    /// アノテーションと対応する音声ファイルを削除する
    ///
    /// 音声ファイルがディスク上に無いのはエラーにしない。それ以外の
    /// ファイルシステムエラーは索引を変更せずに呼び出し側へ伝播する。
    ///
    /// # Errors
    ///
    /// ファイル名が索引に無い場合（二重削除）にエラーを返す。
    pub fn delete_annotation(&mut self, file_name: &str) -> Result<()> {
        let annotation = self
            .annotations
            .get(file_name)
            .ok_or_else(|| anyhow!("不明なアノテーション: {}", file_name))?;
        match fs::remove_file(&annotation.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("音声ファイルの削除に失敗: {:?}", annotation.path)
                });
            }
        }
        self.annotations.remove(file_name);
        Ok(())
    }

    /// TSV サイドカーファイルをディスクから削除する
    ///
    /// ファイルが存在しない場合は何もしない。
    pub fn delete_tsv(&self) -> Result<()> {
        if let Some(tsv_file) = &self.tsv_file {
            if tsv_file.is_file() {
                fs::remove_file(tsv_file)
                    .with_context(|| format!("TSV ファイルの削除に失敗: {:?}", tsv_file))?;
            }
        }
        Ok(())
    }

    /// 挿入順でアノテーションを走査する
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    /// ファイル名でアノテーションを引く
    pub fn get_annotation(&self, file_name: &str) -> Option<&Annotation> {
        self.annotations.get(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.annotations.contains(file_name)
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// 変更済みアノテーションのファイル名リスト
    pub fn modified_annotations(&self) -> &[String] {
        &self.modified_annotations
    }
}

/// 記述子に書く相対パス文字列。未設定は空文字列
fn relative_string(path: Option<&Path>, location: &Path) -> String {
    path.map(|path| {
        paths::relative_to(path, location)
            .to_string_lossy()
            .into_owned()
    })
    .unwrap_or_default()
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map_or(false, |extension| AUDIO_EXTENSIONS.contains(&extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture_project() -> Project {
        let mut project = Project::new();
        project.audio_folder = Some(PathBuf::from("/tmp/audio"));
        project.tsv_file = Some(PathBuf::from("/tmp/project.tsv"));
        let mut annotation = Annotation::new("path");
        annotation.sentence = "text".to_string();
        project.add_annotation(annotation);
        project
    }

    #[test]
    fn test_save_descriptor_relative_paths() {
        let project = fixture_project();
        let mut out = Vec::new();
        project.save(&mut out, Path::new("/tmp")).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "tsv_file": "project.tsv",
                "audio_folder": "audio",
                "modified_annotations": [],
            })
        );
    }

    #[test]
    fn test_save_descriptor_unset_paths_are_empty() {
        let project = Project::new();
        let mut out = Vec::new();
        project.save(&mut out, Path::new("/tmp")).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["tsv_file"], "");
        assert_eq!(value["audio_folder"], "");
    }

    #[test]
    fn test_descriptor_round_trip() {
        let mut project = fixture_project();
        project.annotate("path", "changed");
        let mut out = Vec::new();
        project.save(&mut out, Path::new("/tmp")).unwrap();

        let mut reloaded = Project::new();
        reloaded.load_json(out.as_slice(), Path::new("/tmp")).unwrap();
        assert_eq!(reloaded.tsv_file, Some(PathBuf::from("/tmp/project.tsv")));
        assert_eq!(reloaded.audio_folder, Some(PathBuf::from("/tmp/audio")));
        assert_eq!(reloaded.modified_annotations(), vec!["path".to_string()]);
    }

    #[test]
    fn test_load_json_missing_key_fails() {
        let mut project = Project::new();
        let result = project.load_json(
            r#"{"tsv_file": "a.tsv", "audio_folder": "audio"}"#.as_bytes(),
            Path::new("/tmp"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_json_resolves_against_location() {
        let mut project = Project::new();
        project
            .load_json(
                r#"{"tsv_file": "project.tsv", "audio_folder": "clips", "modified_annotations": ["a.mp3"]}"#
                    .as_bytes(),
                Path::new("/data/projects"),
            )
            .unwrap();
        assert_eq!(project.tsv_file, Some(PathBuf::from("/data/projects/project.tsv")));
        assert_eq!(project.audio_folder, Some(PathBuf::from("/data/projects/clips")));
        assert_eq!(project.modified_annotations(), vec!["a.mp3".to_string()]);
    }

    #[test]
    fn test_load_audio_files_missing_folder_is_tolerated() {
        let mut project = Project::new();
        project
            .load_audio_files(Path::new("/nonexistent/audio"))
            .unwrap();
        assert!(project.is_empty());
    }

    #[test]
    fn test_load_audio_files_filters_extensions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.mp3"), b"").unwrap();
        fs::write(dir.path().join("b.wav"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::write(dir.path().join("upper.MP3"), b"").unwrap();

        let mut project = Project::new();
        project.load_audio_files(dir.path()).unwrap();

        // 拡張子は大文字小文字を区別して照合する
        assert_eq!(project.annotation_count(), 2);
        assert!(project.contains("a.mp3"));
        assert!(project.contains("b.wav"));
        assert_eq!(
            project.get_annotation("a.mp3").unwrap().path,
            dir.path().join("a.mp3")
        );
    }

    #[test]
    fn test_load_audio_files_skips_known_names() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.mp3"), b"").unwrap();

        let mut project = Project::new();
        project.audio_folder = Some(dir.path().to_path_buf());
        let mut known = Annotation::new("a.mp3");
        known.sentence = "kept".to_string();
        project.add_annotation(known);

        project.load_audio_files(dir.path()).unwrap();
        assert_eq!(project.annotation_count(), 1);
        assert_eq!(project.get_annotation("a.mp3").unwrap().sentence, "kept");
    }

    #[test]
    fn test_load_tsv_resolves_paths_and_restores_modified() {
        let mut project = Project::new();
        project
            .load_json(
                r#"{"tsv_file": "project.tsv", "audio_folder": "audio", "modified_annotations": ["a.mp3"]}"#
                    .as_bytes(),
                Path::new("/tmp"),
            )
            .unwrap();

        let data = "client_id\tpath\tsentence\tup_votes\tdown_votes\tage\tgender\taccent\r\n\
                    id\ta.mp3\thello\t2\t1\ttwenties\tmale\t\r\n\
                    \tb.wav\t\t0\t0\t\t\t\r\n";
        project.load_tsv_file(data.as_bytes()).unwrap();

        let first = project.get_annotation("a.mp3").unwrap();
        assert_eq!(first.path, PathBuf::from("/tmp/audio/a.mp3"));
        assert_eq!(first.sentence, "hello");
        assert_eq!(first.up_votes, 2);
        assert!(first.modified);

        let second = project.get_annotation("b.wav").unwrap();
        assert!(!second.modified);
    }

    #[test]
    fn test_load_tsv_keeps_rows_for_missing_audio_files() {
        // ディスク上に存在しないファイルの行もそのまま追加される
        let dir = TempDir::new().unwrap();
        let mut project = Project::new();
        project.audio_folder = Some(dir.path().to_path_buf());

        let data = "client_id\tpath\tsentence\tup_votes\tdown_votes\tage\tgender\taccent\r\n\
                    \tghost.mp3\tlost\t0\t0\t\t\t\r\n";
        project.load_tsv_file(data.as_bytes()).unwrap();

        assert!(project.contains("ghost.mp3"));
        assert_eq!(project.get_annotation("ghost.mp3").unwrap().sentence, "lost");
    }

    #[test]
    fn test_save_annotations_exact_output() {
        let project = fixture_project();
        let mut out = Vec::new();
        project.save_annotations(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "client_id\tpath\tsentence\tup_votes\tdown_votes\tage\tgender\taccent\r\n\
             \tpath\ttext\t0\t0\t\t\t\r\n"
        );
    }

    #[test]
    fn test_tsv_round_trip() {
        let mut project = Project::new();
        project.audio_folder = Some(PathBuf::from("/tmp/audio"));
        let mut first = Annotation::new("a.mp3");
        first.sentence = "one".to_string();
        first.up_votes = 3;
        project.add_annotation(first);
        project.add_annotation(Annotation::new("b.wav"));

        let mut out = Vec::new();
        project.save_annotations(&mut out).unwrap();

        let mut reloaded = Project::new();
        reloaded.audio_folder = Some(PathBuf::from("/tmp/audio"));
        reloaded.load_tsv_file(out.as_slice()).unwrap();

        assert_eq!(reloaded.annotation_count(), 2);
        let first = reloaded.get_annotation("a.mp3").unwrap();
        assert_eq!(first.sentence, "one");
        assert_eq!(first.up_votes, 3);
        assert_eq!(first.path, PathBuf::from("/tmp/audio/a.mp3"));
        assert_eq!(reloaded.get_annotation("b.wav").unwrap().sentence, "");
    }

    #[test]
    fn test_add_annotation_resolves_against_audio_folder() {
        let mut project = Project::new();
        project.audio_folder = Some(PathBuf::from("/tmp/audio"));

        project.add_annotation(Annotation::new("a.mp3"));
        assert_eq!(
            project.get_annotation("a.mp3").unwrap().path,
            PathBuf::from("/tmp/audio/a.mp3")
        );

        // 絶対パスはそのまま通る
        project.add_annotation(Annotation::new("/var/clips/b.mp3"));
        assert_eq!(
            project.get_annotation("b.mp3").unwrap().path,
            PathBuf::from("/var/clips/b.mp3")
        );
    }

    #[test]
    fn test_annotate_sets_text_and_tracks_modification() {
        let mut project = fixture_project();
        assert!(project.annotate("path", "x"));

        let annotation = project.get_annotation("path").unwrap();
        assert_eq!(annotation.sentence, "x");
        assert!(annotation.modified);
        assert_eq!(project.modified_annotations(), vec!["path".to_string()]);
    }

    #[test]
    fn test_annotate_never_double_inserts() {
        let mut project = fixture_project();
        project.annotate("path", "x");
        project.annotate("path", "y");

        assert_eq!(project.modified_annotations().len(), 1);
        assert_eq!(project.get_annotation("path").unwrap().sentence, "y");
    }

    #[test]
    fn test_annotate_unknown_name_has_no_effect() {
        let mut project = fixture_project();
        assert!(!project.annotate("ghost.mp3", "x"));
        assert!(project.modified_annotations().is_empty());
    }

    #[test]
    fn test_mark_unchanged_clears_flag_and_list() {
        let mut project = fixture_project();
        project.annotate("path", "x");

        project.mark_unchanged("path");
        assert!(!project.get_annotation("path").unwrap().modified);
        assert!(project.modified_annotations().is_empty());

        // 既にクリーンなら何もしない
        project.mark_unchanged("path");
        assert!(project.modified_annotations().is_empty());
    }

    #[test]
    fn test_delete_annotation_removes_file_and_entry() {
        let dir = TempDir::new().unwrap();
        let audio = dir.path().join("a.mp3");
        fs::write(&audio, b"data").unwrap();

        let mut project = Project::new();
        project.audio_folder = Some(dir.path().to_path_buf());
        project.add_annotation(Annotation::new("a.mp3"));

        project.delete_annotation("a.mp3").unwrap();
        assert!(!audio.exists());
        assert!(!project.contains("a.mp3"));
    }

    #[test]
    fn test_delete_annotation_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut project = Project::new();
        project.audio_folder = Some(dir.path().to_path_buf());
        project.add_annotation(Annotation::new("ghost.mp3"));

        project.delete_annotation("ghost.mp3").unwrap();
        assert!(!project.contains("ghost.mp3"));
    }

    #[test]
    fn test_double_delete_fails() {
        let dir = TempDir::new().unwrap();
        let mut project = Project::new();
        project.audio_folder = Some(dir.path().to_path_buf());
        project.add_annotation(Annotation::new("a.mp3"));

        project.delete_annotation("a.mp3").unwrap();
        assert!(project.delete_annotation("a.mp3").is_err());
    }

    #[test]
    fn test_delete_tsv_removes_file_once() {
        let dir = TempDir::new().unwrap();
        let tsv = dir.path().join("project.tsv");
        fs::write(&tsv, b"header\r\n").unwrap();

        let mut project = Project::new();
        project.tsv_file = Some(tsv.clone());

        project.delete_tsv().unwrap();
        assert!(!tsv.exists());

        // ファイルが無ければ何もしない
        project.delete_tsv().unwrap();
    }
}
