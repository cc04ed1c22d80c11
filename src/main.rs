use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use env_logger::Env;
use voice_annotation_tool::interchange;
use voice_annotation_tool::project::Project;

fn main() -> Result<()> {
    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // コマンドライン引数をパース
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" {
        print_usage(&args[0]);
        return Ok(());
    }

    // 新規プロジェクト作成モード
    if args[1] == "--new" {
        if args.len() < 5 {
            bail!("--new にはプロジェクトファイル・音声フォルダ・TSV ファイルを指定してください");
        }
        return create_project(
            Path::new(&args[2]),
            Path::new(&args[3]),
            Path::new(&args[4]),
        );
    }

    let project_file = PathBuf::from(&args[1]);
    let mut project = open_project(&project_file)?;

    match args.get(2).map(String::as_str) {
        None => print_summary(&project),
        Some("--export-csv") => {
            let path = file_argument(&args)?;
            let file = File::create(path)
                .with_context(|| format!("出力ファイルを作成できません: {}", path))?;
            interchange::export_csv(&project, file)?;
            println!("CSV にエクスポートしました: {}", path);
        }
        Some("--export-json") => {
            let path = file_argument(&args)?;
            let file = File::create(path)
                .with_context(|| format!("出力ファイルを作成できません: {}", path))?;
            interchange::export_json(&project, file)?;
            println!("JSON にエクスポートしました: {}", path);
        }
        Some("--import-csv") => {
            let path = file_argument(&args)?;
            let file = File::open(path)
                .with_context(|| format!("入力ファイルを開けません: {}", path))?;
            interchange::import_csv(&mut project, file)?;
            save_project(&project, &project_file)?;
            println!("CSV からインポートしました: {}", path);
        }
        Some("--import-json") => {
            let path = file_argument(&args)?;
            let file = File::open(path)
                .with_context(|| format!("入力ファイルを開けません: {}", path))?;
            interchange::import_json(&mut project, file)?;
            save_project(&project, &project_file)?;
            println!("JSON からインポートしました: {}", path);
        }
        Some(flag) => bail!("不明なオプション: {}", flag),
    }

    Ok(())
}

fn print_usage(program: &str) {
    println!("使い方:");
    println!("  {} <project.json>", program);
    println!("      プロジェクトを開いて概要を表示");
    println!("  {} --new <project.json> <音声フォルダ> <tsvファイル>", program);
    println!("      音声フォルダを走査して新規プロジェクトを作成");
    println!("  {} <project.json> --export-csv <file>", program);
    println!("  {} <project.json> --export-json <file>", program);
    println!("      文字起こしを交換形式に書き出し");
    println!("  {} <project.json> --import-csv <file>", program);
    println!("  {} <project.json> --import-json <file>", program);
    println!("      交換形式から文字起こしを取り込んで保存");
}

fn file_argument(args: &[String]) -> Result<&str> {
    args.get(3)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("対象ファイルを指定してください"))
}

/// プロジェクトを開く: 記述子 → TSV → 音声フォルダの順
fn open_project(project_file: &Path) -> Result<Project> {
    let location = project_file.parent().unwrap_or_else(|| Path::new("."));
    let mut project = Project::new();

    let file = File::open(project_file)
        .with_context(|| format!("プロジェクトファイルを開けません: {:?}", project_file))?;
    project
        .load_json(file, location)
        .with_context(|| format!("プロジェクトファイルの読み込みに失敗: {:?}", project_file))?;

    if let Some(tsv_file) = project.tsv_file.clone() {
        if tsv_file.is_file() {
            let file = File::open(&tsv_file)
                .with_context(|| format!("TSV ファイルを開けません: {:?}", tsv_file))?;
            project.load_tsv_file(file)?;
        } else {
            // 新規プロジェクトはまだサイドカーを持たない
            log::warn!("TSV ファイルが見つかりません: {:?}", tsv_file);
        }
    }

    if let Some(folder) = project.audio_folder.clone() {
        project.load_audio_files(&folder)?;
    }

    Ok(project)
}

/// 記述子と TSV サイドカーをまとめて書き出す
fn save_project(project: &Project, project_file: &Path) -> Result<()> {
    let location = project_file.parent().unwrap_or_else(|| Path::new("."));
    let file = File::create(project_file)
        .with_context(|| format!("プロジェクトファイルの書き込みに失敗: {:?}", project_file))?;
    project.save(file, location)?;

    if let Some(tsv_file) = &project.tsv_file {
        let file = File::create(tsv_file)
            .with_context(|| format!("TSV ファイルの書き込みに失敗: {:?}", tsv_file))?;
        project.save_annotations(file)?;
    }
    Ok(())
}

fn create_project(project_file: &Path, audio_folder: &Path, tsv_file: &Path) -> Result<()> {
    let mut project = Project::new();
    project.tsv_file = Some(tsv_file.to_path_buf());
    project.load_audio_files(audio_folder)?;
    save_project(&project, project_file)?;

    println!("プロジェクトを作成しました: {}", project_file.display());
    println!("サンプル数: {}", project.annotation_count());
    Ok(())
}

fn print_summary(project: &Project) {
    let transcribed = project
        .annotations()
        .filter(|annotation| !annotation.sentence.is_empty())
        .count();
    println!("サンプル数: {}", project.annotation_count());
    println!("文字起こし済み: {}", transcribed);
    println!("要確認 (変更済み): {}", project.modified_annotations().len());
    if let Some(folder) = &project.audio_folder {
        if !folder.is_dir() {
            println!("警告: 音声フォルダが存在しません: {}", folder.display());
        }
    }
}
