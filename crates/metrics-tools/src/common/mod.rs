//! テーブル入出力と列定義の共通モジュール

pub mod columns;
pub mod io;
