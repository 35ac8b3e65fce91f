//! Staff position codes per subject type.

pub(super) const BOOK: &[(u32, &str)] = &[
    (2001, "作者"),
    (2002, "作画"),
    (2003, "插图"),
    (2004, "出版社"),
    (2005, "连载杂志"),
    (2006, "译者"),
    (2007, "原作"),
    (2008, "客串"),
    (2009, "人物原案"),
    (2010, "脚本"),
    (2011, "书系"),
    (2012, "出品方"),
    (2013, "图书品牌"),
    (2003, "插画"),
];

pub(super) const ANIME: &[(u32, &str)] = &[
    (1, "原作"),
    (2, "导演"),
    (3, "脚本"),
    (4, "分镜"),
    (5, "演出"),
    (6, "音乐"),
    (7, "人物原案"),
    (8, "人物设定"),
    (9, "构图"),
    (10, "系列构成"),
    (11, "美术监督"),
    (13, "色彩设计"),
    (14, "总作画监督"),
    (15, "作画监督"),
    (16, "机械设定"),
    (17, "摄影监督"),
    (18, "监修"),
    (19, "道具设计"),
    (20, "原画"),
    (21, "第二原画"),
    (22, "动画检查"),
    (25, "背景美术"),
    (26, "色彩指定"),
    (28, "剪辑"),
    (29, "原案"),
    (30, "主题歌编曲"),
    (31, "主题歌作曲"),
    (32, "主题歌作词"),
    (33, "主题歌演出"),
    (34, "插入歌演出"),
    (35, "企画"),
    (37, "制作管理"),
    (39, "录音"),
    (41, "系列监督"),
    (42, "製作"),
    (44, "音响监督"),
    (47, "特效"),
    (49, "联合导演"),
    (54, "制片人"),
    (63, "动画制作"),
    (74, "总导演"),
    (2, "监督"),
];

pub(super) const MUSIC: &[(u32, &str)] = &[
    (3001, "艺术家"),
    (3002, "制作人"),
    (3003, "作曲"),
    (3004, "厂牌"),
    (3005, "原作"),
    (3006, "作词"),
    (3007, "录音"),
    (3008, "编曲"),
    (3009, "插图"),
    (3010, "脚本"),
    (3011, "出版方"),
    (3012, "母带制作"),
    (3013, "混音"),
    (3014, "乐器"),
    (3015, "声乐"),
];

pub(super) const GAME: &[(u32, &str)] = &[
    (1001, "开发"),
    (1002, "发行"),
    (1003, "游戏设计师"),
    (1004, "剧本"),
    (1005, "美工"),
    (1006, "音乐"),
    (1007, "关卡设计"),
    (1008, "人物设定"),
    (1009, "主题歌作曲"),
    (1010, "主题歌作词"),
    (1011, "主题歌演出"),
    (1012, "插入歌演出"),
    (1013, "原画"),
    (1014, "动画制作"),
    (1015, "原作"),
    (1016, "导演"),
    (1017, "动画监督"),
    (1018, "制作总指挥"),
    (1019, "QC"),
    (1020, "动画剧本"),
    (1021, "程序"),
    (1022, "协力"),
    (1023, "CG 监修"),
    (1024, "SD原画"),
    (1025, "背景"),
    (1026, "监修"),
    (1027, "系列构成"),
    (1028, "企画"),
    (1029, "机械设定"),
    (1030, "音响监督"),
    (1031, "作画监督"),
    (1032, "制作人"),
];

pub(super) const LIVE_ACTION: &[(u32, &str)] = &[
    (4001, "原作"),
    (4002, "导演"),
    (4003, "编剧"),
    (4004, "音乐"),
    (4005, "执行制片人"),
    (4006, "共同执行制作"),
    (4007, "制片人"),
    (4008, "监制"),
    (4009, "副制作人"),
    (4010, "故事"),
    (4011, "编审"),
    (4012, "剪辑"),
    (4013, "创意总监"),
    (4014, "摄影"),
    (4015, "主题歌演出"),
    (4016, "主演"),
    (4017, "配角"),
    (4018, "制作"),
    (4019, "出品"),
];
