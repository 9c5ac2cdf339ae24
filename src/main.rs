// 该文件是 Fenjian （分拣） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use fenjian::{
  FromUrl, Pipeline, PipelineConfig, PipelineContext,
  input::ImageFileInput,
  model::{InferenceDiscipline, Yolov8SegBuilder},
  output::{DirectoryRecordOutput, DrawConfig},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  if let Some(output) = &args.output {
    info!("存档目录: {}", output);
  }

  info!("正在加载模型...");
  let model = Yolov8SegBuilder::from_url(&args.model)?.build()?;
  let context = PipelineContext::new(model);

  let mut config = PipelineConfig::default()
    .with_parallel_stages(!args.sequential)
    .with_draw(DrawConfig::default().with_show_score(!args.hide_score));
  if args.serialize_inference {
    config = config.with_discipline(InferenceDiscipline::Serialized);
  }
  let pipeline = Pipeline::new(context, config)?;

  let output = args
    .output
    .as_ref()
    .map(|url| {
      DirectoryRecordOutput::from_url(url)
        .map(|output| output.with_catalog(pipeline.catalog().clone()))
    })
    .transpose()?;

  let input = ImageFileInput::from_url(&args.input)?;
  for upload in input {
    let processed = pipeline.process(&upload)?;

    for item in processed.detections.iter() {
      info!(
        "  - {}: {:.2}% at [{:.0}, {:.0}, {:.0}, {:.0}]",
        pipeline.catalog().get(item.class_id).unwrap_or("?"),
        item.score * 100.0,
        item.bbox[0],
        item.bbox[1],
        item.bbox[2],
        item.bbox[3]
      );
    }

    if processed.labels.is_empty() {
      println!("No objects detected.");
    } else {
      println!("Detected: {}", processed.labels);
    }

    if let Some(output) = &output {
      let stored = output.store(&upload, &processed)?;
      info!("标注图像已保存: {}", stored.annotated.display());
    }
  }

  Ok(())
}
