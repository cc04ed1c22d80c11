//! 外部ツールとの文字起こし一括交換
//!
//! プロジェクト自身の永続化形式（JSON 記述子 + TSV サイドカー）とは
//! 別の、プレーンな CSV / JSON 交換形式を読み書きする。どの関数も
//! プロジェクトのアノテーション集合に対して動く状態レスな操作で、
//! ファイルハンドルは呼び出し側が用意する。
//!
//! 未知のファイル名の扱いは形式毎に異なる: CSV インポートは最初の
//! 未知の行で全体を打ち切り、JSON インポートは該当行だけを読み飛ばす。
//! この非対称は仕様であり、揃えてはいけない。

use std::collections::HashMap;
use std::io::{Read, Write};

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::project::Project;

/// セミコロン区切りの2列 CSV (`ファイル名;文字起こし`) を取り込む
///
/// 行毎に1列目のファイル名でアノテーションを引いて文字起こしを
/// 適用する。未知のファイル名に当たった時点でインポート全体を
/// 中断する。それ以前に適用済みの行は巻き戻されない。
pub fn import_csv<R: Read>(project: &mut Project, reader: R) -> Result<()> {
    let mut rows = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    for row in rows.records() {
        let record = row.context("CSV 行のパースに失敗")?;
        let file_name = record.get(0).unwrap_or("");
        let text = record.get(1).unwrap_or("");
        if !project.annotate(file_name, text) {
            log::warn!("不明なファイル名のためインポートを中断: {}", file_name);
            return Ok(());
        }
    }
    Ok(())
}

/// アノテーションを2列 CSV に書き出す
///
/// 挿入順で1行ずつ `パス;文字起こし`。行末は CRLF。
pub fn export_csv<W: Write>(project: &Project, writer: W) -> Result<()> {
    let mut rows = csv::WriterBuilder::new()
        .delimiter(b';')
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);
    for annotation in project.annotations() {
        let path = annotation.path.to_string_lossy();
        rows.write_record([path.as_ref(), annotation.sentence.as_str()])
            .with_context(|| format!("CSV 行の書き込みに失敗: {}", annotation.file_name()))?;
    }
    rows.flush().context("CSV の書き出しに失敗")?;
    Ok(())
}

/// JSON 交換形式 (`[{"ファイル名": "文字起こし"}, ...]`) を取り込む
///
/// 認識できたファイル名にだけ文字起こしを適用し、未知のものは
/// 警告なしに読み飛ばす。
pub fn import_json<R: Read>(project: &mut Project, reader: R) -> Result<()> {
    let rows: Vec<HashMap<String, String>> =
        serde_json::from_reader(reader).context("JSON 交換形式のパースに失敗")?;
    for row in rows {
        for (file_name, text) in row {
            project.annotate(&file_name, &text);
        }
    }
    Ok(())
}

/// アノテーションを JSON 交換形式に書き出す
///
/// 挿入順で、アノテーション毎に単一キーのオブジェクトを1つ。
/// キーはファイル名（フルパスではない）。
pub fn export_json<W: Write>(project: &Project, writer: W) -> Result<()> {
    let rows: Vec<Map<String, Value>> = project
        .annotations()
        .map(|annotation| {
            let mut row = Map::new();
            row.insert(
                annotation.file_name(),
                Value::String(annotation.sentence.clone()),
            );
            row
        })
        .collect();
    serde_json::to_writer(writer, &rows).context("JSON 交換形式の書き込みに失敗")?;
    Ok(())
}
