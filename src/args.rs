// 该文件是 Fenjian （分拣） 项目的一部分。
// src/args.rs - 命令行参数
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use clap::Parser;
use url::Url;

/// Fenjian 垃圾分拣识别
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 yolov8seg:///models/best.onnx?labels=/models/labels.json&conf=0.25
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 上传图像，例如 image:///tmp/upload.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 结果存档目录，例如 folder:///predicts（省略则不保存）
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 标注中不显示置信度
  #[arg(long)]
  pub hide_score: bool,

  /// 标签提取与渲染顺序执行
  #[arg(long)]
  pub sequential: bool,

  /// 串行调用推理后端
  #[arg(long)]
  pub serialize_inference: bool,
}
